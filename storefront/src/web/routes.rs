// dairy_storefront/src/web/routes.rs

use actix_web::{web, HttpResponse};

use crate::errors::AppError;
use crate::web::handlers::{
  admin_handlers, delivery_handlers, order_handlers, payment_handlers, product_handlers, refund_handlers,
  subscription_handlers,
};

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({ "success": true, "status": "ok" }))
}

/// Malformed bodies, queries and path ids come back in the usual error envelope.
fn extractor_configs(cfg: &mut web::ServiceConfig) {
  cfg
    .app_data(web::JsonConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into()))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into()))
    .app_data(web::PathConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into()));
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  extractor_configs(cfg);
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .service(
        web::scope("/products")
          .route("", web::get().to(product_handlers::list_products_handler))
          .route("/{product_id}", web::get().to(product_handlers::get_product_handler)),
      )
      .route("/delivery-slots", web::get().to(order_handlers::delivery_slots_handler))
      .service(
        web::scope("/orders")
          .route("", web::post().to(order_handlers::create_order_handler))
          .route("", web::get().to(order_handlers::list_my_orders_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_my_order_handler))
          .route("/{order_id}/cancel", web::post().to(order_handlers::cancel_order_handler)),
      )
      .service(
        web::scope("/payments/sessions")
          .route("", web::post().to(payment_handlers::create_payment_session_handler))
          .route("/{session_id}", web::get().to(payment_handlers::get_payment_session_handler))
          .route("/{session_id}/submit", web::post().to(payment_handlers::submit_payment_handler)),
      )
      .service(
        web::scope("/subscription-plans")
          .route("", web::get().to(subscription_handlers::list_plans_handler))
          .route("/{plan_id}", web::get().to(subscription_handlers::get_plan_handler)),
      )
      .service(
        web::scope("/subscriptions")
          .route("", web::post().to(subscription_handlers::subscribe_handler))
          .route("", web::get().to(subscription_handlers::list_my_subscriptions_handler))
          .route("/{subscription_id}/cancel", web::post().to(subscription_handlers::cancel_subscription_handler))
          .route("/{subscription_id}/pause", web::post().to(subscription_handlers::pause_subscription_handler))
          .route("/{subscription_id}/resume", web::post().to(subscription_handlers::resume_subscription_handler)),
      )
      .service(
        web::scope("/refunds")
          .route("", web::post().to(refund_handlers::create_refund_handler))
          .route("", web::get().to(refund_handlers::list_my_refunds_handler)),
      )
      .service(
        web::scope("/delivery/orders")
          .route("", web::get().to(delivery_handlers::assigned_orders_handler))
          .route("/{order_id}/delivered", web::post().to(delivery_handlers::mark_delivered_handler)),
      )
      .service(web::scope("/admin").configure(configure_admin_routes)),
  );
}

fn configure_admin_routes(cfg: &mut web::ServiceConfig) {
  cfg
    .service(
      web::scope("/orders")
        .route("", web::get().to(admin_handlers::admin_list_orders_handler))
        .route("/pending", web::get().to(admin_handlers::admin_pending_orders_handler))
        .route("/{order_id}/status", web::post().to(admin_handlers::admin_update_order_status_handler))
        .route("/{order_id}/assign", web::post().to(admin_handlers::admin_assign_order_handler)),
    )
    .service(
      web::scope("/payments")
        .route("/pending", web::get().to(admin_handlers::admin_pending_payments_handler))
        .route("/{session_id}/verify", web::post().to(admin_handlers::admin_verify_payment_handler)),
    )
    .service(
      web::scope("/products")
        .route("", web::post().to(product_handlers::admin_create_product_handler))
        .route("", web::get().to(product_handlers::admin_list_products_handler))
        .route("/{product_id}", web::patch().to(product_handlers::admin_update_product_handler)),
    )
    .service(
      web::scope("/subscription-plans")
        .route("", web::post().to(subscription_handlers::admin_create_plan_handler))
        .route("", web::get().to(subscription_handlers::admin_list_plans_handler))
        .route("/{plan_id}", web::patch().to(subscription_handlers::admin_update_plan_handler))
        .route("/{plan_id}", web::delete().to(subscription_handlers::admin_deactivate_plan_handler)),
    )
    .service(
      web::scope("/subscriptions")
        .route("/pending", web::get().to(subscription_handlers::admin_pending_subscriptions_handler))
        .route(
          "/{subscription_id}/payment",
          web::post().to(subscription_handlers::admin_verify_subscription_payment_handler),
        )
        .route(
          "/{subscription_id}/cancellation",
          web::post().to(subscription_handlers::admin_resolve_cancellation_handler),
        )
        .route("/{subscription_id}/deliveries", web::post().to(subscription_handlers::admin_record_delivery_handler)),
    )
    .service(
      web::scope("/delivery-persons")
        .route("", web::post().to(admin_handlers::admin_create_delivery_person_handler))
        .route("", web::get().to(admin_handlers::admin_list_delivery_persons_handler))
        .route("/{person_id}/status", web::post().to(admin_handlers::admin_set_delivery_person_status_handler)),
    )
    .service(
      web::scope("/refunds")
        .route("", web::get().to(refund_handlers::admin_list_refunds_handler))
        .route("/{refund_id}/resolve", web::post().to(refund_handlers::admin_resolve_refund_handler)),
    );
}
