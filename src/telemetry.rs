//! Configuração do `tracing-subscriber`.
//!
//! Prioridade do filtro: `RUST_LOG` > `--verbose` > `log_level` do arquivo de
//! configuração. Builds de debug usam saída legível; builds de release usam JSON.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Inicializa o subscriber global. Chamadas repetidas são ignoradas.
pub fn init(log_level: &str, verbose: bool) {
    let level = if verbose { "debug" } else { log_level };
    let default_filter = format!("{level},floorforge={level},tower_http={level}");
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(true))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    }
}
