//! `meshrelay check-config`: validate configuration and backend wiring.

use std::path::Path;

use anyhow::{Result, bail};
use console::style;

use meshrelay_core::llm::LlmBackend;
use meshrelay_infra::config::{resolve_api_key, resolve_database_path};
use meshrelay_infra::llm::build_backend_chain;
use meshrelay_types::config::{LlmBackendConfig, RelayConfig};

/// Report the effective configuration. Fails when the backend chain cannot
/// be built (e.g. missing API key).
pub fn check_config(config: &RelayConfig, config_path: &Path, json: bool) -> Result<()> {
    let file_exists = config_path.exists();
    let chain = build_backend_chain(&config.llm);
    let backends: Vec<(&str, &LlmBackendConfig)> = std::iter::once(("primary", &config.llm.primary))
        .chain(config.llm.fallback.as_ref().map(|fb| ("fallback", fb)))
        .collect();

    if json {
        let out = serde_json::json!({
            "config_path": config_path.display().to_string(),
            "config_file_exists": file_exists,
            "database": resolve_database_path(config_path, config).display().to_string(),
            "bot_name": config.bot.name,
            "command_prefix": config.commands.prefix.to_string(),
            "memory": config.memory,
            "rate_limits": {
                "messages_per_minute": config.rate_limits.messages_per_minute,
                "global_messages_per_minute": config.rate_limits.global_messages_per_minute,
                "burst_allowance": config.rate_limits.burst_allowance,
                "cooldown_seconds": config.rate_limits.cooldown_seconds,
                "vip_users": config.rate_limits.vip_users.len(),
            },
            "backends": backends.iter().map(|(role, b)| serde_json::json!({
                "role": role,
                "backend": b.backend.to_string(),
                "model": b.model,
                "base_url": b.base_url,
                "api_key_present": resolve_api_key(b).is_some(),
                "timeout_secs": b.timeout_secs,
            })).collect::<Vec<_>>(),
            "valid": chain.is_ok(),
            "error": chain.as_ref().err().map(|e| e.to_string()),
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
    } else {
        let mark = |ok: bool| {
            if ok {
                format!("{}", style("✓").green())
            } else {
                format!("{}", style("✗").red())
            }
        };

        println!();
        println!(
            "  {} Config: {}{}",
            mark(true),
            style(config_path.display()).cyan(),
            if file_exists { "" } else { " (not found, using defaults)" }
        );
        println!(
            "  {} Database: {}",
            mark(true),
            style(resolve_database_path(config_path, config).display()).dim()
        );
        println!(
            "  {} Bot '@{}', prefix '{}', memory window {} / threshold {}",
            mark(true),
            config.bot.name,
            config.commands.prefix,
            config.memory.window_size,
            config.memory.summarize_threshold
        );
        for (role, backend) in &backends {
            let key_present = resolve_api_key(backend).is_some();
            println!(
                "  {} {} backend: {} {} (key {})",
                mark(key_present || backend.base_url.is_some()),
                role,
                backend.backend,
                style(&backend.model).cyan(),
                if key_present { "found" } else { "missing" }
            );
        }
        match &chain {
            Ok(chain) => println!("  {} Backend chain: {}", mark(true), chain.name()),
            Err(e) => println!("  {} {}", mark(false), style(e).red()),
        }
        println!();
    }

    if let Err(e) = chain {
        bail!(e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshrelay_types::llm::BackendKind;

    #[test]
    fn local_backend_passes() {
        let mut config = RelayConfig::default();
        config.llm.primary.base_url = Some("http://localhost:11434/v1".to_string());
        let dir = tempfile::tempdir().unwrap();
        check_config(&config, &dir.path().join("meshrelay.toml"), true).unwrap();
    }

    #[test]
    fn literal_anthropic_key_passes() {
        let mut config = RelayConfig::default();
        config.llm.primary.backend = BackendKind::Anthropic;
        config.llm.primary.api_key = Some("sk-ant-literal".to_string());
        let dir = tempfile::tempdir().unwrap();
        check_config(&config, &dir.path().join("meshrelay.toml"), false).unwrap();
    }

    #[test]
    fn unresolvable_key_reference_fails() {
        let mut config = RelayConfig::default();
        config.llm.primary.backend = BackendKind::Anthropic;
        config.llm.primary.api_key = Some("${MESHRELAY_TEST_UNSET_KEY_VAR}".to_string());
        let dir = tempfile::tempdir().unwrap();
        assert!(check_config(&config, &dir.path().join("meshrelay.toml"), true).is_err());
    }
}
