use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::qr::handler::generate_qr,
    ),
    components(schemas(crate::features::health::HealthResponse)),
    tags(
        (name = "QR", description = "QR code image APIs"),
        (name = "Health", description = "Health APIs"),
    ),
    info(
        title = "QR Image Service API",
        version = "0.1.0",
        description = "Text to QR code PNG service with optional logo overlay (Axum)"
    )
)]
pub struct ApiDoc;
