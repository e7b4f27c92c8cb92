use std::any::TypeId;
use std::sync::Arc;
use std::time::Duration;

use ingest_core::connector::IngestConnector;
use ingest_core::middleware::{Middleware, ValidationContext};
use ingest_core::{IngestError, RateLimitTracker};
use ingest_middleware::ConnectorBuilder;
use ingest_types::{Capability, ProviderDescriptor, RateLimitConfig};

struct StubConnector;

impl IngestConnector for StubConnector {
    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            key: "stub".to_string(),
            name: "Stub".to_string(),
            supported_asset_classes: vec![],
            capabilities: vec![Capability::History],
            priority: 0,
        }
    }
}

/// Example custom middleware that requires rate-limiting to already be present.
struct CustomMiddleware;

impl Middleware for CustomMiddleware {
    fn apply(self: Box<Self>, inner: Arc<dyn IngestConnector>) -> Arc<dyn IngestConnector> {
        inner
    }

    fn name(&self) -> &'static str {
        "CustomMiddleware"
    }

    fn config_json(&self) -> serde_json::Value {
        serde_json::json!({})
    }

    fn validate(&self, ctx: &ValidationContext) -> Result<(), IngestError> {
        if !ctx.has_middleware(TypeId::of::<ingest_middleware::RateLimitMiddleware>()) {
            return Err(IngestError::InvalidMiddlewareStack {
                message: "CustomMiddleware requires RateLimitMiddleware to be present".to_string(),
            });
        }
        Ok(())
    }
}

#[test]
fn validation_fails_when_dependency_missing() {
    let raw: Arc<dyn IngestConnector> = Arc::new(StubConnector);
    let result = ConnectorBuilder::new(raw).layer(CustomMiddleware).build();

    match result {
        Err(IngestError::InvalidMiddlewareStack { message }) => {
            assert!(message.contains("RateLimitMiddleware"));
        }
        _ => panic!("Expected InvalidMiddlewareStack error"),
    }
}

#[test]
fn validation_succeeds_when_dependency_present() {
    let raw: Arc<dyn IngestConnector> = Arc::new(StubConnector);
    let tracker = Arc::new(RateLimitTracker::new());
    let result = ConnectorBuilder::new(raw)
        .with_rate_limit(RateLimitConfig::default(), tracker)
        .layer(CustomMiddleware)
        .build();

    assert!(result.is_ok());
    let connector = result.unwrap();
    assert_eq!(connector.descriptor().key, "stub");
}

#[test]
fn validation_context_reports_correct_positions() {
    struct PositionCheckingMiddleware;

    impl Middleware for PositionCheckingMiddleware {
        fn apply(self: Box<Self>, inner: Arc<dyn IngestConnector>) -> Arc<dyn IngestConnector> {
            inner
        }

        fn name(&self) -> &'static str {
            "PositionCheckingMiddleware"
        }

        fn config_json(&self) -> serde_json::Value {
            serde_json::json!({})
        }

        fn validate(&self, ctx: &ValidationContext) -> Result<(), IngestError> {
            let has_rate_limit_outer =
                ctx.has_middleware_outer(TypeId::of::<ingest_middleware::RateLimitMiddleware>());
            let has_blacklist_outer =
                ctx.has_middleware_outer(TypeId::of::<ingest_middleware::BlacklistMiddleware>());
            let has_rate_limit_inner =
                ctx.has_middleware_inner(TypeId::of::<ingest_middleware::RateLimitMiddleware>());

            if !has_rate_limit_outer || !has_blacklist_outer {
                return Err(IngestError::InvalidMiddlewareStack {
                    message: "Expected RateLimit and Blacklist to be outer".to_string(),
                });
            }
            if has_rate_limit_inner {
                return Err(IngestError::InvalidMiddlewareStack {
                    message: "Expected to be innermost".to_string(),
                });
            }
            Ok(())
        }
    }

    let raw: Arc<dyn IngestConnector> = Arc::new(StubConnector);
    let tracker = Arc::new(RateLimitTracker::new());
    let result = ConnectorBuilder::new(raw)
        .layer(PositionCheckingMiddleware) // innermost
        .with_rate_limit(RateLimitConfig::default(), tracker) // middle
        .with_blacklist(Duration::from_secs(60)) // outermost
        .build();

    assert!(result.is_ok());
}
