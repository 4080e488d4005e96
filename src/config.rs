//! Configuração do floorforge carregada a partir de `floorforge.toml`.
//!
//! A struct [`AppConfig`] contém os parâmetros do serviço (endereços, diretórios,
//! colaboradores externos) e os valores iniciais de [`PipelineParams`].
//! Valores não presentes no arquivo usam defaults sensíveis.
//! A variável de ambiente `ANTHROPIC_API_KEY` tem precedência sobre o arquivo.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ForgeError;
use crate::params::PipelineParams;

/// Nome do arquivo procurado no diretório atual quando `--config` não é passado.
pub const DEFAULT_CONFIG_FILE: &str = "floorforge.toml";

/// Configuração de nível superior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Endereço em que o servidor HTTP escuta.
    pub bind: String,
    /// Diretório onde os arquivos enviados são gravados.
    pub upload_dir: PathBuf,
    /// Diretório onde os modelos IFC gerados são gravados.
    pub output_dir: PathBuf,
    /// Nível de log padrão quando `RUST_LOG` não está definido.
    pub log_level: String,
    /// Endpoint do serviço de detecção.
    pub detector_url: String,
    /// Endpoint do serviço de geração do modelo.
    pub generator_url: String,
    /// Prazo por chamada a qualquer colaborador externo, em segundos.
    pub collaborator_timeout_secs: u64,
    /// Mantém o status `Error` visível após uma falha em vez de voltar a `Idle`.
    pub retain_error_state: bool,
    /// Valores iniciais dos parâmetros do pipeline.
    pub defaults: PipelineParams,
    pub llm: LlmConfig,
}

/// Parâmetros do modelo de linguagem usado pelo chat.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Chave da API Anthropic. Vazia desativa o caminho baseado em modelo.
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    /// URL base alternativa (útil para testes ou proxies).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: "claude-haiku-4-5-20251001".to_string(),
            base_url: None,
            max_tokens: 512,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
            upload_dir: PathBuf::from("uploads"),
            output_dir: PathBuf::from("outputs"),
            log_level: "info".to_string(),
            detector_url: "http://127.0.0.1:8100/detect".to_string(),
            generator_url: "http://127.0.0.1:8200/generate".to_string(),
            collaborator_timeout_secs: 120,
            retain_error_state: false,
            defaults: PipelineParams::default(),
            llm: LlmConfig::default(),
        }
    }
}

impl AppConfig {
    /// Carrega a configuração de `path`, ou de `floorforge.toml` no diretório atual.
    /// Usa valores padrão se o arquivo padrão não existir; um caminho explícito
    /// inexistente é erro.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)?
                } else {
                    Self::default()
                }
            }
        };

        // Variável de ambiente tem precedência sobre o arquivo de configuração para a chave API.
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY")
            && !key.is_empty()
        {
            config.llm.api_key = key;
        }

        config.validate()?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = toml::from_str::<AppConfig>(&contents).map_err(ForgeError::from)?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ForgeError> {
        self.defaults
            .validate()
            .map_err(|e| ForgeError::Config(format!("[defaults]: {e}")))?;
        if self.collaborator_timeout_secs == 0 {
            return Err(ForgeError::Config(
                "collaborator_timeout_secs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }

    /// O chat usa o modelo de linguagem apenas quando há chave configurada.
    pub fn llm_enabled(&self) -> bool {
        !self.llm.api_key.is_empty()
    }
}
