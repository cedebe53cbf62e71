//! 配置校验模块
//!
//! 校验规则：
//! - 显式目标列表与 bootstrap_servers 简写互斥
//! - 至少一个目标，地址与 topic 非空，目标 ID 唯一
//! - partition >= 0
//! - failure_threshold >= 1, per_send_timeout_ms > 0, queue_capacity >= 1, max_payload_bytes >= 1
//! - backoff_base_ms <= backoff_max_ms
//! - 1 <= min_successful_destinations <= 目标数

use std::collections::HashSet;

use contracts::{ContractError, DestinationConfig, SinkBlueprint, SinkSettings};

/// 校验 SinkBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &SinkBlueprint) -> Result<(), ContractError> {
    validate_destination_source(blueprint)?;
    let destinations = blueprint.resolved_destinations();
    validate_destinations(&destinations)?;
    validate_settings(&blueprint.sink)?;
    validate_min_successful(&blueprint.sink, destinations.len())?;
    Ok(())
}

/// 校验目标来源：显式列表与简写只能二选一
fn validate_destination_source(blueprint: &SinkBlueprint) -> Result<(), ContractError> {
    let has_shorthand = blueprint.bootstrap_servers.is_some();

    if has_shorthand && !blueprint.destinations.is_empty() {
        return Err(ContractError::config_validation(
            "bootstrap_servers",
            "bootstrap_servers cannot be combined with [[destinations]]",
        ));
    }

    if has_shorthand && blueprint.topic.as_deref().is_none_or(str::is_empty) {
        return Err(ContractError::config_validation(
            "topic",
            "topic is required when bootstrap_servers is used",
        ));
    }

    Ok(())
}

/// 校验目标列表
fn validate_destinations(destinations: &[DestinationConfig]) -> Result<(), ContractError> {
    if destinations.is_empty() {
        return Err(ContractError::config_validation(
            "destinations",
            "at least one destination must be configured",
        ));
    }

    let mut seen = HashSet::new();
    for (idx, dest) in destinations.iter().enumerate() {
        if dest.address.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("destinations[{idx}].address"),
                "address cannot be empty",
            ));
        }
        if dest.topic.trim().is_empty() {
            return Err(ContractError::config_validation(
                format!("destinations[{idx}].topic"),
                "topic cannot be empty",
            ));
        }
        if let Some(partition) = dest.partition {
            if partition < 0 {
                return Err(ContractError::config_validation(
                    format!("destinations[{idx}].partition"),
                    format!("partition must be >= 0, got {partition}"),
                ));
            }
        }
        if !seen.insert(dest.id()) {
            return Err(ContractError::config_validation(
                format!("destinations[address={}]", dest.address),
                "duplicate destination address",
            ));
        }
    }
    Ok(())
}

/// 校验投递策略
fn validate_settings(settings: &SinkSettings) -> Result<(), ContractError> {
    if settings.failure_threshold == 0 {
        return Err(ContractError::config_validation(
            "sink.failure_threshold",
            "failure_threshold must be >= 1",
        ));
    }

    if settings.per_send_timeout_ms == 0 {
        return Err(ContractError::config_validation(
            "sink.per_send_timeout_ms",
            "per_send_timeout_ms must be > 0",
        ));
    }

    if settings.queue_capacity == 0 {
        return Err(ContractError::config_validation(
            "sink.queue_capacity",
            "queue_capacity must be >= 1",
        ));
    }

    if settings.max_payload_bytes == 0 {
        return Err(ContractError::config_validation(
            "sink.max_payload_bytes",
            "max_payload_bytes must be >= 1",
        ));
    }

    if settings.backoff_base_ms > settings.backoff_max_ms {
        return Err(ContractError::config_validation(
            "sink.backoff_base_ms / sink.backoff_max_ms",
            format!(
                "backoff_base_ms ({}) must be <= backoff_max_ms ({})",
                settings.backoff_base_ms, settings.backoff_max_ms
            ),
        ));
    }

    Ok(())
}

/// 校验最少成功投递数
fn validate_min_successful(
    settings: &SinkSettings,
    destination_count: usize,
) -> Result<(), ContractError> {
    let min = settings.min_successful_destinations;
    if min == 0 || min > destination_count {
        return Err(ContractError::config_validation(
            "sink.min_successful_destinations",
            format!("min_successful_destinations must be in 1..={destination_count}, got {min}"),
        ));
    }
    Ok(())
}
