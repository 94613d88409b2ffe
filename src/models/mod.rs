pub mod lease;
pub mod maintenance;
pub mod message;
pub mod payment;
pub mod property;
pub mod user;

pub use lease::{
    can_terminate, ranges_overlap, status_after_sign, CreateLeaseRequest, Lease, LeaseParty,
    LeaseResponse, LeaseSignature, LeaseStatus, LeasesQuery, SignLeaseRequest, UpdateLeaseRequest,
};
pub use maintenance::{
    update_mask_for_role, AssignMaintenanceRequest, CreateMaintenanceRequest, MaintenanceCategory,
    MaintenanceFieldMask, MaintenancePhoto, MaintenancePriority, MaintenanceQuery,
    MaintenanceRequest, MaintenanceRequestResponse, MaintenanceStatus, UpdateMaintenanceRequest,
};
pub use message::{
    conversation_id, ConversationResponse, Message, MessageResponse, MessagesQuery,
    SendMessageRequest,
};
pub use payment::{
    generate_receipt_number, CreatePaymentRequest, GenerationSummary, Payment, PaymentResponse,
    PaymentStatus, PaymentType, PaymentsQuery, ProcessPaymentRequest, ReceiptResponse,
};
pub use property::{
    AssignManagerRequest, AssignTenantRequest, CreatePropertyRequest, Property, PropertyImage,
    PropertyResponse, PropertyStatus, PropertyType, SearchPropertiesQuery, UpdatePropertyRequest,
};
pub use user::{
    AuthResponse, LoginRequest, RefreshToken, RefreshTokenRequest, RegisterRequest, TokenResponse,
    UpdateUserRequest, User, UserPublic, UserRole,
};
