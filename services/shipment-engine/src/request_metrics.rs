use crate::metrics::{HTTP_REQUESTS_TOTAL, HTTP_REQUEST_DURATION};
use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures_util::future::LocalBoxFuture;
use std::future::{ready, Ready};
use std::rc::Rc;
use std::time::Instant;

/// Counts and times every request, labelled by route pattern
pub struct RequestMetrics;

impl<S, B> Transform<S, ServiceRequest> for RequestMetrics
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RequestMetricsMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RequestMetricsMiddleware {
            service: Rc::new(service),
        }))
    }
}

pub struct RequestMetricsMiddleware<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for RequestMetricsMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let method = req.method().to_string();
        // Patterns, not raw paths, so tracking codes don't become label values
        let path = req
            .request()
            .match_pattern()
            .unwrap_or_else(|| "unmatched".to_string());
        let started = Instant::now();

        let fut = self.service.call(req);
        Box::pin(async move {
            let result = fut.await;
            let status = match &result {
                Ok(res) => res.status(),
                Err(err) => err.as_response_error().status_code(),
            };

            HTTP_REQUEST_DURATION
                .with_label_values(&[method.as_str(), path.as_str()])
                .observe(started.elapsed().as_secs_f64());
            HTTP_REQUESTS_TOTAL
                .with_label_values(&[method.as_str(), path.as_str(), status.as_str()])
                .inc();
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security_middleware::JwtAuth;
    use actix_web::{test, web, App, HttpResponse};

    fn requests(path: &str, status: &str) -> u64 {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["GET", path, status])
            .get()
    }

    #[actix_web::test]
    async fn test_records_route_pattern_and_status() {
        let app = test::init_service(
            App::new()
                .wrap(RequestMetrics)
                .route("/health", web::get().to(|| async { HttpResponse::Ok().finish() }))
                .route(
                    "/shipments/track/{code}",
                    web::get().to(|| async { HttpResponse::Ok().finish() }),
                ),
        )
        .await;

        let health_before = requests("/health", "200");
        let track_before = requests("/shipments/track/{code}", "200");
        let timed_before = HTTP_REQUEST_DURATION
            .with_label_values(&["GET", "/health"])
            .get_sample_count();

        let req = test::TestRequest::get().uri("/health").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());

        let req = test::TestRequest::get()
            .uri("/shipments/track/SHIP-0000000001")
            .to_request();
        test::call_service(&app, req).await;

        assert!(requests("/health", "200") > health_before);
        assert!(requests("/shipments/track/{code}", "200") > track_before);
        assert!(
            HTTP_REQUEST_DURATION
                .with_label_values(&["GET", "/health"])
                .get_sample_count()
                > timed_before
        );
    }

    #[actix_web::test]
    async fn test_records_status_of_rejected_request() {
        let app = test::init_service(
            App::new()
                .wrap(JwtAuth::new("secret".to_string()))
                .wrap(RequestMetrics)
                .route("/points/me", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let before = requests("/points/me", "401");
        let req = test::TestRequest::get().uri("/points/me").to_request();
        let err = match app.call(req).await {
            Ok(_) => panic!("request without a token was accepted"),
            Err(err) => err,
        };
        assert_eq!(err.as_response_error().status_code().as_u16(), 401);
        assert!(requests("/points/me", "401") > before);
    }
}
