//! `cogloop config`: Configuration management commands.

use std::time::Duration;

use cogloop_config::AppConfig;

const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(10);

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = warnings(&config);
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            let reasoning = &config.reasoning;
            println!();
            println!("   Provider:    {}", config.default_provider);
            println!("   Model:       {}", config.default_model);
            println!("   Max rounds:  {}", reasoning.max_rounds);
            match reasoning.stagnation_window {
                Some(window) => println!("   Stagnation:  {window} round(s)"),
                None => println!("   Stagnation:  disabled"),
            }
            println!("   Timeout:     {}s per call", reasoning.per_call_timeout_secs);
            println!("   Retries:     {}", reasoning.retry.max_retries);

            check_provider(&config).await;
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

/// Probe the default provider's `/models` endpoint.
async fn check_provider(config: &AppConfig) {
    let router = cogloop_providers::build_from_config(config);
    let Some(provider) = router.default() else {
        println!(
            "   ⚠️  Default provider '{}' is not registered",
            config.default_provider
        );
        return;
    };

    println!();
    match tokio::time::timeout(HEALTH_CHECK_TIMEOUT, provider.health_check()).await {
        Ok(Ok(true)) => {
            println!("   ✅ Provider '{}' is reachable", provider.name());
            if let Ok(Ok(models)) =
                tokio::time::timeout(HEALTH_CHECK_TIMEOUT, provider.list_models()).await
            {
                let known = models.iter().any(|m| m == &config.default_model);
                println!("   Models:      {} listed", models.len());
                if !models.is_empty() && !known {
                    println!(
                        "   ⚠️  Model '{}' is not in the provider's list",
                        config.default_model
                    );
                }
            }
        }
        Ok(Ok(false)) => {
            println!("   ⚠️  Provider '{}' rejected the health check", provider.name())
        }
        Ok(Err(e)) => println!("   ❌ Provider '{}' unreachable: {e}", provider.name()),
        Err(_) => println!(
            "   ❌ Provider '{}' did not answer within {}s",
            provider.name(),
            HEALTH_CHECK_TIMEOUT.as_secs()
        ),
    }
}

/// Non-fatal issues worth pointing out.
fn warnings(config: &AppConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.api_key.is_none() && config.providers.values().all(|p| p.api_key.is_none()) {
        warnings.push(
            "No API key set (set OPENROUTER_API_KEY, OPENAI_API_KEY or COGLOOP_API_KEY)".into(),
        );
    }

    let reasoning = &config.reasoning;
    if reasoning.max_rounds == 1 {
        warnings.push("max_rounds = 1: the refiner will never run".into());
    }
    if let Some(window) = reasoning.stagnation_window
        && window.max(2) >= reasoning.max_rounds
    {
        warnings.push(format!(
            "stagnation_window ({window}) >= max_rounds ({}): it can never fire",
            reasoning.max_rounds
        ));
    }

    warnings
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}

fn redacted(mut config: AppConfig) -> AppConfig {
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("[REDACTED]".into());
        }
    }
    config
}
