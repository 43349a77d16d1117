use kre_runner_sdk::prelude::*;

/// Greeting worker module
///
/// `init` stores the greeting in the context; `handle` greets `data["name"]`
/// with it and saves a few sample metrics on the way.
#[derive(Debug, Default)]
pub struct Greeting;

impl Greeting {
    pub fn new() -> Self {
        Self
    }
}

impl WorkerModule for Greeting {
    fn name(&self) -> &str {
        "greeting"
    }

    fn init(&self, ctx: &dyn Context) -> Result<(), HandlerError> {
        tracing::info!("[worker init]");
        ctx.set_value("greeting", json!("Hello"));
        Ok(())
    }

    fn handle(&self, ctx: &dyn Context, data: RequestData) -> Result<HandlerOutput, HandlerError> {
        tracing::info!("[worker handler]");
        let greeting = ctx
            .get_str("greeting")
            .ok_or_else(|| HandlerError::MissingKey("greeting".to_string()))?;
        let result = format!("{} {}!", greeting, data.require_str("name")?);
        tracing::info!("{}", result);

        tracing::info!("Saving some metrics...");
        let dated = SaveMetric::new()
            .date_rfc3339("2020-04-06T09:02:09.277853Z")
            .map_err(|e| HandlerError::Internal(e.to_string()))?;
        ctx.save_metric(dated.predicted_value("class_x").true_value("class_y"));

        let missing = SaveMetric::new()
            .error(ERR_MISSING_VALUES)
            .date_rfc3339("2020-04-07T00:00:00.0Z")
            .map_err(|e| HandlerError::Internal(e.to_string()))?;
        ctx.save_metric(missing);

        // Undated: the host stamps the current time
        ctx.save_metric(SaveMetric::new().error(ERR_NEW_LABELS));

        Ok(HandlerOutput::result(result))
    }
}

kre_runner_sdk::worker_module!(Greeting::new());

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingContext {
        values: Mutex<HashMap<String, JsonValue>>,
        metrics: Mutex<Vec<SaveMetric>>,
    }

    impl Context for RecordingContext {
        fn set_value(&self, key: &str, value: JsonValue) {
            self.values.lock().unwrap().insert(key.to_string(), value);
        }

        fn get_value(&self, key: &str) -> Option<JsonValue> {
            self.values.lock().unwrap().get(key).cloned()
        }

        fn save_metric(&self, metric: SaveMetric) {
            self.metrics.lock().unwrap().push(metric);
        }
    }

    #[test]
    fn test_init_sets_greeting() {
        let ctx = RecordingContext::default();
        Greeting::new().init(&ctx).unwrap();
        assert_eq!(ctx.get_value("greeting"), Some(json!("Hello")));
    }

    #[test]
    fn test_handle_greets_and_saves_metrics() {
        let ctx = RecordingContext::default();
        let module = Greeting::new();
        module.init(&ctx).unwrap();

        let out = module
            .handle(&ctx, RequestData::new().with("name", "World"))
            .unwrap();
        assert_eq!(out.into_value(), json!({"result": "Hello World!"}));

        let metrics = ctx.metrics.lock().unwrap();
        assert_eq!(metrics.len(), 3);
        assert_eq!(metrics[0].predicted_value.as_deref(), Some("class_x"));
        assert_eq!(metrics[0].true_value.as_deref(), Some("class_y"));
        assert!(metrics[0].error.is_none());
        assert_eq!(metrics[1].error, Some(ERR_MISSING_VALUES));
        assert!(metrics[1].date.is_some());
        assert_eq!(metrics[2].error, Some(ERR_NEW_LABELS));
        assert!(metrics[2].date.is_none());
    }

    #[test]
    fn test_missing_name() {
        let ctx = RecordingContext::default();
        let module = Greeting::new();
        module.init(&ctx).unwrap();

        let err = module.handle(&ctx, RequestData::new()).unwrap_err();
        assert!(matches!(err, HandlerError::MissingKey(key) if key == "name"));
        assert!(ctx.metrics.lock().unwrap().is_empty());
    }

    #[test]
    fn test_handle_without_init_has_no_greeting() {
        let ctx = RecordingContext::default();
        let err = Greeting::new()
            .handle(&ctx, RequestData::new().with("name", "World"))
            .unwrap_err();
        assert!(matches!(err, HandlerError::MissingKey(key) if key == "greeting"));
    }
}
