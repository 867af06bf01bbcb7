//! Configuração do carflow carregada a partir de `carflow.toml`.
//!
//! A struct [`CarflowConfig`] contém os parâmetros do fluxo de publicação.
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `CARFLOW_LOG_FORMAT` tem precedência sobre o arquivo.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::pipeline::{FlowSettings, RetryConfig};

/// Configuração de nível superior carregada de `carflow.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct CarflowConfig {
    /// Intervalo em minutos entre ciclos do agendador.
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Template de anúncio usado para novos cartões.
    #[serde(default = "default_template_id")]
    pub default_template_id: String,

    /// Perfil do navegador usado pelo publicador.
    #[serde(default)]
    pub profile_id: String,

    /// Máximo de retentativas para falhas de sistema dos colaboradores.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Atraso base em milissegundos para backoff exponencial.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Formato dos logs: "text" ou "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

// Valor padrão para o intervalo: 5 minutos.
fn default_interval_minutes() -> u64 {
    5
}

// Valor padrão para o template: "sale".
fn default_template_id() -> String {
    "sale".to_string()
}

// Valor padrão para retentativas máximas: 3.
fn default_max_retries() -> u32 {
    3
}

// Valor padrão para o atraso base: 1000ms.
fn default_base_delay_ms() -> u64 {
    1000
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Default for CarflowConfig {
    fn default() -> Self {
        Self {
            interval_minutes: default_interval_minutes(),
            default_template_id: default_template_id(),
            profile_id: String::new(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            log_format: default_log_format(),
        }
    }
}

impl CarflowConfig {
    /// Carrega a configuração do caminho indicado (`--config`, por padrão
    /// `carflow.toml`). Usa valores padrão se o arquivo não existir.
    pub fn load_from(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            toml::from_str::<CarflowConfig>(&contents)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            Self::default()
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração.
        if let Ok(format) = std::env::var("CARFLOW_LOG_FORMAT") {
            if !format.is_empty() {
                config.log_format = format;
            }
        }

        Ok(config)
    }

    /// Converte a configuração nos parâmetros do [`FlowRunner`](crate::pipeline::FlowRunner).
    pub fn flow_settings(&self) -> FlowSettings {
        FlowSettings {
            template_id: self.default_template_id.clone(),
            profile_id: self.profile_id.clone(),
            retry: RetryConfig {
                max_retries: self.max_retries,
                base_delay_ms: self.base_delay_ms,
            },
            interval: Duration::from_secs(self.interval_minutes * 60),
        }
    }
}
