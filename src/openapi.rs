use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "PropertyHub API",
        version = "1.0.0",
        description = "Backend API for PropertyHub - rental property management platform",
        contact(
            name = "PropertyHub Team",
            email = "support@propertyhub.app"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development server")
    ),
    tags(
        (name = "auth", description = "Authentication and token management"),
        (name = "users", description = "User profiles"),
        (name = "properties", description = "Property listings and assignments"),
        (name = "leases", description = "Lease agreements and signatures"),
        (name = "payments", description = "Rent payments, card processing and receipts"),
        (name = "maintenance", description = "Maintenance requests"),
        (name = "messages", description = "Direct messages between users")
    ),
    paths(
        // Auth
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::auth::refresh_token,
        crate::api::auth::logout,
        // Users
        crate::api::users::get_me,
        crate::api::users::update_me,
        crate::api::users::upload_avatar,
        crate::api::users::get_user,
        // Properties
        crate::api::properties::create_property,
        crate::api::properties::list_properties,
        crate::api::properties::get_property,
        crate::api::properties::update_property,
        crate::api::properties::delete_property,
        crate::api::properties::upload_image,
        crate::api::properties::assign_tenant,
        crate::api::properties::unassign_tenant,
        crate::api::properties::assign_manager,
        // Leases
        crate::api::leases::create_lease,
        crate::api::leases::list_leases,
        crate::api::leases::get_lease,
        crate::api::leases::update_lease,
        crate::api::leases::delete_lease,
        crate::api::leases::sign_lease,
        crate::api::leases::terminate_lease,
        crate::api::leases::generate_lease_payment,
        // Payments
        crate::api::payments::create_payment,
        crate::api::payments::list_payments,
        crate::api::payments::get_payment,
        crate::api::payments::delete_payment,
        crate::api::payments::process_payment,
        crate::api::payments::refund_payment,
        crate::api::payments::get_receipt,
        crate::api::payments::generate_payments,
        // Maintenance
        crate::api::maintenance::create_request,
        crate::api::maintenance::list_requests,
        crate::api::maintenance::get_request,
        crate::api::maintenance::update_request,
        crate::api::maintenance::delete_request,
        crate::api::maintenance::assign_request,
        crate::api::maintenance::upload_photo,
        // Messages
        crate::api::messages::send_message,
        crate::api::messages::list_conversations,
        crate::api::messages::get_conversation,
    ),
    components(
        schemas(
            // Auth and users
            crate::models::RegisterRequest,
            crate::models::LoginRequest,
            crate::models::AuthResponse,
            crate::models::RefreshTokenRequest,
            crate::models::TokenResponse,
            crate::models::UserPublic,
            crate::models::UserRole,
            crate::models::UpdateUserRequest,
            crate::api::auth::LogoutResponse,
            crate::api::users::AvatarUploadResponse,
            // Properties
            crate::models::PropertyStatus,
            crate::models::PropertyType,
            crate::models::PropertyResponse,
            crate::models::CreatePropertyRequest,
            crate::models::UpdatePropertyRequest,
            crate::models::SearchPropertiesQuery,
            crate::models::AssignTenantRequest,
            crate::models::AssignManagerRequest,
            crate::api::properties::SuccessResponse,
            crate::api::properties::ImageUploadResponse,
            // Leases
            crate::models::LeaseStatus,
            crate::models::LeaseParty,
            crate::models::LeaseSignature,
            crate::models::LeaseResponse,
            crate::models::CreateLeaseRequest,
            crate::models::UpdateLeaseRequest,
            crate::models::SignLeaseRequest,
            crate::models::LeasesQuery,
            crate::api::leases::GeneratePaymentResponse,
            // Payments
            crate::models::PaymentStatus,
            crate::models::PaymentType,
            crate::models::PaymentResponse,
            crate::models::CreatePaymentRequest,
            crate::models::ProcessPaymentRequest,
            crate::models::ReceiptResponse,
            crate::models::PaymentsQuery,
            crate::models::GenerationSummary,
            // Maintenance
            crate::models::MaintenanceCategory,
            crate::models::MaintenanceStatus,
            crate::models::MaintenancePriority,
            crate::models::MaintenanceRequestResponse,
            crate::models::CreateMaintenanceRequest,
            crate::models::UpdateMaintenanceRequest,
            crate::models::AssignMaintenanceRequest,
            crate::models::MaintenanceQuery,
            // Messages
            crate::models::MessageResponse,
            crate::models::ConversationResponse,
            crate::models::SendMessageRequest,
            crate::models::MessagesQuery,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                utoipa::openapi::security::SecurityScheme::Http(
                    utoipa::openapi::security::Http::new(
                        utoipa::openapi::security::HttpAuthScheme::Bearer,
                    ),
                ),
            );
        }
    }
}
