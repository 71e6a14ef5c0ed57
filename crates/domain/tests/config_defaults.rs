use vg_domain::config::{Config, GeneratorBackend, TtsBackend};

#[test]
fn default_host_is_localhost() {
    let config = Config::default();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8000);
}

#[test]
fn empty_toml_resolves_to_defaults() {
    let config: Config = toml::from_str("").unwrap();
    assert_eq!(config.generator.backend, GeneratorBackend::Local);
    assert_eq!(config.generator.api_url, "http://localhost:8080/completion");
    assert_eq!(config.tts.backend, TtsBackend::Edge);
    assert!(config.tts.auto_language);
    assert_eq!(config.tts.lang_decide_chars, 120);
    assert_eq!(config.metrics.log_dir, "logs");
}

#[test]
fn explicit_sections_parse() {
    let toml_str = r#"
[server]
host = "0.0.0.0"
port = 9100
instance_id = "fixed-instance"

[generator]
backend = "echo"

[tts]
backend = "piper"
piper_model_path_zh = "voices/zh.onnx"
piper_model_path_en = "voices/en.onnx"
target_sample_rate = 16000
auto_language = false

[metrics]
log_dir = "/var/log/voicegate"
"#;
    let config: Config = toml::from_str(toml_str).unwrap();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.instance_id.as_deref(), Some("fixed-instance"));
    assert_eq!(config.generator.backend, GeneratorBackend::Echo);
    assert_eq!(config.tts.backend, TtsBackend::Piper);
    assert_eq!(config.tts.target_sample_rate, Some(16000));
    assert!(!config.tts.auto_language);
    assert_eq!(config.tts.piper_model_path_en.as_deref(), Some("voices/en.onnx"));
    assert_eq!(config.metrics.log_dir, "/var/log/voicegate");
}

#[test]
fn unknown_backend_is_rejected() {
    let toml_str = r#"
[tts]
backend = "espeak"
"#;
    assert!(toml::from_str::<Config>(toml_str).is_err());
}
