//! Request and response models for the marketplace API

pub mod brand;
pub mod category;
pub mod contact;
pub mod coupon;
pub mod search;
pub mod stats;
pub mod submission;
pub mod usage;
pub mod user;

pub use brand::{
    Brand, BrandListQuery, BrandUpdate, CreateBrandRequest, NewBrand, SponsoredQuery,
};
pub use category::{
    Category, CategoryListQuery, CategorySummary, CategoryUpdate, CreateCategoryRequest,
};
pub use contact::{ContactListQuery, ContactRequest, ContactSubmission, ContactType};
pub use coupon::{
    Coupon, CouponListQuery, CouponType, CouponUpdate, CouponView, CreateCouponRequest,
    DiscountType, NewCoupon,
};
pub use search::{SearchQuery, SearchResults, SearchScope};
pub use stats::{AdminStats, AnalyticsQuery, DailyUsage, TopCoupon, UsageAnalytics, UserStats};
pub use submission::{
    BrandDraft, CouponDraft, CreateSubmissionRequest, Submission, SubmissionAction,
    SubmissionListQuery, SubmissionPatch, SubmissionStatus, SubmissionType,
};
pub use usage::{CouponUsage, NewUsage, UsageQuery, UsageView};
pub use user::{
    AdminUserPatch, AdminUserQuery, ChangePasswordRequest, FavoriteRequest, ForceLogoutRequest,
    SessionQuery, SettingsPatch, UpdateProfileRequest, UserProfile,
};
