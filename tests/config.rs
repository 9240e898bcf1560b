use nimproxy::config::{BackendAuthType, BackendConfig, FeatureFlags, UnknownFieldPolicy};

fn test_runtime() -> nimproxy::app::RuntimeConfig {
    nimproxy::app::RuntimeConfig {
        listen: "127.0.0.1:0".to_string(),
        metrics_path: "/internal/metrics".to_string(),
        backend: BackendConfig::bearer("http://127.0.0.1:9/v1", ""),
        features: FeatureFlags::default(),
        unknown_fields: UnknownFieldPolicy::Preserve,
        request_timeout_ms: 1_000,
    }
}

#[tokio::test]
async fn state_loads_without_api_key() {
    let state = nimproxy::app::load_state_with_runtime(test_runtime()).expect("load state");
    assert_eq!(state.runtime.metrics_path, "/internal/metrics");
    assert!(!state.gateway.features().show_reasoning);
    assert!(!state.gateway.models().list_models().is_empty());
}

// Everything touching the process environment stays in this one test.
#[test]
fn runtime_config_reads_environment() {
    let keys = [
        "NIMPROXY_LISTEN",
        "PORT",
        "NIMPROXY_METRICS_PATH",
        "NIM_API_BASE",
        "NIM_API_KEY",
        "NIM_AUTH_HEADER",
        "NIMPROXY_SHOW_REASONING",
        "NIMPROXY_ENABLE_THINKING",
        "NIMPROXY_REQUEST_TIMEOUT_MS",
        "NIMPROXY_UNKNOWN_FIELDS",
    ];
    unsafe {
        for key in keys {
            std::env::remove_var(key);
        }
    }

    let defaults = nimproxy::app::RuntimeConfig::from_env();
    assert_eq!(defaults.listen, "0.0.0.0:3000");
    assert_eq!(defaults.metrics_path, "/metrics");
    assert_eq!(defaults.backend.base_url, "https://integrate.api.nvidia.com/v1");
    assert_eq!(defaults.backend.auth.auth_type, BackendAuthType::Bearer);
    assert!(!defaults.features.show_reasoning);
    assert!(!defaults.features.enable_thinking);
    assert_eq!(defaults.request_timeout_ms, 120_000);
    assert_eq!(defaults.unknown_fields, UnknownFieldPolicy::Ignore);

    unsafe {
        std::env::set_var("PORT", "8080");
        std::env::set_var("NIM_API_KEY", "nvapi-abc");
        std::env::set_var("NIM_AUTH_HEADER", "x-api-key");
        std::env::set_var("NIMPROXY_SHOW_REASONING", "true");
        std::env::set_var("NIMPROXY_ENABLE_THINKING", "1");
        std::env::set_var("NIMPROXY_REQUEST_TIMEOUT_MS", "not-a-number");
        std::env::set_var("NIMPROXY_UNKNOWN_FIELDS", "reject");
    }
    let custom = nimproxy::app::RuntimeConfig::from_env();
    assert_eq!(custom.listen, "0.0.0.0:8080");
    assert_eq!(custom.backend.auth.value, "nvapi-abc");
    assert_eq!(custom.backend.auth.auth_type, BackendAuthType::Header);
    assert_eq!(custom.backend.auth.header_name.as_deref(), Some("x-api-key"));
    assert!(custom.features.show_reasoning);
    assert!(custom.features.enable_thinking);
    assert_eq!(custom.request_timeout_ms, 120_000);
    assert_eq!(custom.unknown_fields, UnknownFieldPolicy::Reject);

    unsafe {
        std::env::set_var("NIMPROXY_LISTEN", "127.0.0.1:4000");
    }
    assert_eq!(nimproxy::app::RuntimeConfig::from_env().listen, "127.0.0.1:4000");

    unsafe {
        for key in keys {
            std::env::remove_var(key);
        }
    }
}
