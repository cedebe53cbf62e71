//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use contracts::{ContractError, SinkBlueprint};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// 从内容推断格式：以 `{` 开头视为 JSON，否则按 TOML 处理
    pub fn sniff(content: &str) -> Self {
        if content.trim_start().starts_with('{') {
            Self::Json
        } else {
            Self::Toml
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Toml => "TOML",
            Self::Json => "JSON",
        }
    }
}

fn parse_error<E>(format: ConfigFormat, e: E) -> ContractError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ContractError::ConfigParse {
        message: format!("{} parse error: {e}", format.name()),
        source: Some(Box::new(e)),
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<SinkBlueprint, ContractError> {
    toml::from_str(content).map_err(|e| parse_error(ConfigFormat::Toml, e))
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<SinkBlueprint, ContractError> {
    serde_json::from_str(content).map_err(|e| parse_error(ConfigFormat::Json, e))
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<SinkBlueprint, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_toml_explicit_destinations() {
        let content = r#"
[sink]
name = "orders"
per_send_timeout_ms = 500

[[destinations]]
address = "localhost:9092"
topic = "myTopic"
partition = 0

[[destinations]]
address = "localhost:9093"
topic = "myTopic"
transport = "log"
"#;
        let result = parse_toml(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.sink.name, "orders");
        assert_eq!(bp.sink.per_send_timeout_ms, 500);
        assert_eq!(bp.destinations.len(), 2);
        assert_eq!(bp.destinations[1].partition, None);
        assert_eq!(bp.destinations[1].transport, contracts::TransportKind::Log);
    }

    #[test]
    fn test_parse_toml_shorthand() {
        let content = r#"
bootstrap_servers = "localhost:9092,localhost:9093"
topic = "myTopic"
partition = 0
"#;
        let bp = parse_toml(content).unwrap();
        assert_eq!(bp.resolved_destinations().len(), 2);
        // 未配置的策略取默认值
        assert_eq!(bp.sink.failure_threshold, 3);
    }

    #[test]
    fn test_parse_json_minimal() {
        let content = r#"{
            "sink": { "format": "bincode", "min_successful_destinations": 2 },
            "destinations": [
                { "address": "dc1:9092", "topic": "t" },
                { "address": "dc2:9092", "topic": "t", "partition": 3 }
            ]
        }"#;
        let result = parse_json(content);
        assert!(result.is_ok(), "Failed: {:?}", result.err());
        let bp = result.unwrap();
        assert_eq!(bp.sink.format, contracts::EncodingFormat::Bincode);
        assert_eq!(bp.destinations[1].partition, Some(3));
    }

    #[test]
    fn test_parse_toml_syntax_error() {
        let content = "invalid toml [[[";
        let result = parse_toml(content);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert!(matches!(err, ContractError::ConfigParse { .. }));
    }

    #[test]
    fn test_unknown_enum_value_rejected() {
        let content = r#"
[sink]
open_policy = "sometimes"
"#;
        assert!(parse_toml(content).is_err());
    }

    #[test]
    fn test_format_from_extension() {
        assert_eq!(
            ConfigFormat::from_extension("toml"),
            Some(ConfigFormat::Toml)
        );
        assert_eq!(
            ConfigFormat::from_extension("JSON"),
            Some(ConfigFormat::Json)
        );
        assert_eq!(ConfigFormat::from_extension("yaml"), None);
    }

    #[test]
    fn test_sniff_format() {
        assert_eq!(ConfigFormat::sniff("  {\"sink\": {}}"), ConfigFormat::Json);
        assert_eq!(ConfigFormat::sniff("[sink]\nname = \"x\""), ConfigFormat::Toml);
    }
}
