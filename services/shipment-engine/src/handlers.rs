use crate::errors::ShipmentEngineError;
use crate::metrics;
use crate::models::{CreateShipmentRequest, InitializePaymentRequest};
use crate::security_middleware::Caller;
use crate::services::ShipmentService;
use actix_web::{web, HttpResponse};
use serde_json::json;
use std::sync::Arc;

/// Health check endpoint
pub async fn health_check() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "shipment-engine",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Book a shipment on a carrier's flight
pub async fn create_shipment(
    service: web::Data<Arc<ShipmentService>>,
    caller: Caller,
    request: web::Json<CreateShipmentRequest>,
) -> Result<HttpResponse, ShipmentEngineError> {
    let response = service
        .create_shipment(caller.user_id, request.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(response))
}

/// Public tracking lookup
pub async fn track_shipment(
    service: web::Data<Arc<ShipmentService>>,
    tracking_code: web::Path<String>,
) -> Result<HttpResponse, ShipmentEngineError> {
    let view = service.track(&tracking_code).await?;
    Ok(HttpResponse::Ok().json(view))
}

/// Acceptor confirms the item arrived
pub async fn confirm_delivery(
    service: web::Data<Arc<ShipmentService>>,
    tracking_code: web::Path<String>,
) -> Result<HttpResponse, ShipmentEngineError> {
    let response = service.confirm_delivery(&tracking_code).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Open a gateway checkout for a shipment
pub async fn initialize_payment(
    service: web::Data<Arc<ShipmentService>>,
    _caller: Caller,
    request: web::Json<InitializePaymentRequest>,
) -> Result<HttpResponse, ShipmentEngineError> {
    let response = service.initialize_payment(request.into_inner()).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Confirm a payment with the gateway
pub async fn verify_payment(
    service: web::Data<Arc<ShipmentService>>,
    reference: web::Path<String>,
) -> Result<HttpResponse, ShipmentEngineError> {
    let response = service.verify_payment(&reference).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Flights a sender can book
pub async fn available_flights(
    service: web::Data<Arc<ShipmentService>>,
    _caller: Caller,
) -> Result<HttpResponse, ShipmentEngineError> {
    let flights = service.available_flights().await?;
    Ok(HttpResponse::Ok().json(flights))
}

/// Shipments carried by the calling carrier
pub async fn carrier_shipments(
    service: web::Data<Arc<ShipmentService>>,
    caller: Caller,
) -> Result<HttpResponse, ShipmentEngineError> {
    let shipments = service.carrier_shipments(caller.user_id).await?;
    Ok(HttpResponse::Ok().json(shipments))
}

/// Loyalty points of the caller
pub async fn my_points(
    service: web::Data<Arc<ShipmentService>>,
    caller: Caller,
) -> Result<HttpResponse, ShipmentEngineError> {
    let response = service.points(caller.user_id).await?;
    Ok(HttpResponse::Ok().json(response))
}

/// Prometheus metrics endpoint
pub async fn metrics_endpoint() -> HttpResponse {
    match metrics::metrics_handler() {
        Ok(body) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(body),
        Err(e) => HttpResponse::InternalServerError().json(json!({
            "error": "Failed to gather metrics",
            "details": e.to_string()
        })),
    }
}

/// Configure routes
pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/shipments")
            .route("", web::post().to(create_shipment))
            .route("/track/{tracking_code}", web::get().to(track_shipment))
            .route("/confirm/{tracking_code}", web::post().to(confirm_delivery)),
    )
    .service(
        web::scope("/payments")
            .route("/initialize", web::post().to(initialize_payment))
            .route("/verify/{reference}", web::get().to(verify_payment)),
    )
    .route("/sender/flights", web::get().to(available_flights))
    .route("/sender/shipments", web::post().to(create_shipment))
    .route("/carrier/shipments", web::get().to(carrier_shipments))
    .route("/points/me", web::get().to(my_points))
    .route("/metrics", web::get().to(metrics_endpoint))
    .route("/health", web::get().to(health_check));
}
