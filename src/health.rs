use crate::state::AppState;
use actix_web::{web, HttpResponse};
use serde_json::json;

pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let config = state.get_config();
    let metrics = state.get_metrics_snapshot();
    let active_sessions = state.dispatcher.registry().active_count();
    let max_sessions = config.performance.max_concurrent_sessions;

    let session_usage = if max_sessions > 0 {
        active_sessions as f64 / max_sessions as f64
    } else {
        0.0
    };
    let load_status = if session_usage > 0.9 {
        "high_load"
    } else if session_usage > 0.7 {
        "moderate_load"
    } else {
        "normal"
    };

    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "uptime_seconds": state.get_uptime_seconds(),
        "service": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION"),
            "host": config.server.host,
            "port": config.server.port
        },
        "metrics": {
            "total_events": metrics.event_count,
            "total_errors": metrics.error_count,
            "error_rate": if metrics.event_count > 0 {
                metrics.error_count as f64 / metrics.event_count as f64
            } else {
                0.0
            }
        },
        "sessions": {
            "active": active_sessions,
            "max": max_sessions,
            "usage_percent": (session_usage * 100.0).round(),
            "status": load_status
        }
    }))
}
