//! Credential flow counters
//!
//! - `gsheet_token_refresh_total` (counter): label `outcome`
//! - `gsheet_authorization_total` (counter): label `outcome`
//!
//! Calls are no-ops until the host installs a recorder.

/// Record one refresh-token exchange. Coalesced waiters count once.
pub fn record_refresh(outcome: &str) {
    metrics::counter!("gsheet_token_refresh_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record the end of one interactive authorization attempt.
pub fn record_authorization(outcome: &str) {
    metrics::counter!("gsheet_authorization_total", "outcome" => outcome.to_string())
        .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    #[test]
    fn record_functions_do_not_panic_without_recorder() {
        record_refresh("success");
        record_authorization("timeout");
    }

    #[test]
    fn counters_render_with_outcome_labels() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        let _guard = metrics::set_default_local_recorder(&recorder);
        record_refresh("success");
        record_refresh("success");
        record_refresh("failure");
        record_authorization("invalid_callback");

        let output = handle.render();
        assert!(
            output.contains(r#"gsheet_token_refresh_total{outcome="success"} 2"#),
            "got:\n{output}"
        );
        assert!(output.contains(r#"gsheet_token_refresh_total{outcome="failure"} 1"#));
        assert!(output.contains(r#"gsheet_authorization_total{outcome="invalid_callback"} 1"#));
    }
}
