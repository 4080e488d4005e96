//! Interface de linha de comando do floorforge baseada em clap.
//!
//! Subcomandos: `serve` (API HTTP), `process` (executa um desenho localmente)
//! e `show-config`. Flags globais: `--config` e `--verbose`.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// floorforge: converte plantas 2D em modelos IFC 3D.
#[derive(Debug, Parser)]
#[command(name = "floorforge", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho do arquivo TOML de configuração (padrão: ./floorforge.toml se existir).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Habilita saída detalhada (nível debug).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sobe a API HTTP.
    Serve {
        /// Endereço de escuta; sobrescreve `bind` do arquivo de configuração.
        #[arg(long)]
        bind: Option<String>,
    },

    /// Processa um desenho e imprime o resultado em JSON.
    Process {
        /// Caminho do desenho (imagem ou PDF).
        file: PathBuf,

        /// Metros por pixel, apenas para esta execução.
        #[arg(long)]
        scale: Option<f64>,

        /// Altura do pavimento em metros.
        #[arg(long)]
        height: Option<f64>,

        /// Número de pavimentos.
        #[arg(long)]
        floor_count: Option<u32>,

        /// Confiança mínima da detecção, entre 0 e 1.
        #[arg(long)]
        conf_threshold: Option<f64>,
    },

    /// Mostra a configuração efetiva (sem a chave da API).
    ShowConfig,
}
