//! Interface de linha de comando do carflow baseada em clap.
//!
//! Define a struct [`Cli`] com subcomandos [`Command`] (validate, map, demo, edges)
//! e flags globais (--config, --verbose).

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// carflow: ciclo de vida de anúncios de carros, das fotos à publicação.
#[derive(Debug, Parser)]
#[command(name = "carflow", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Caminho para o arquivo de configuração.
    #[arg(long, global = true, default_value = "carflow.toml")]
    pub config: PathBuf,

    /// Habilita saída detalhada (verbose).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Valida um resultado de IA (ou um mapeamento Avito) em JSON.
    Validate {
        /// Arquivo JSON a validar.
        file: PathBuf,

        /// Valida como mapeamento Avito em vez de resultado de IA.
        #[arg(long)]
        mapping: bool,
    },

    /// Gera o payload do formulário Avito a partir de um resultado de IA.
    Map {
        /// Arquivo JSON com o resultado de IA.
        file: PathBuf,

        /// Caminho de foto local (pode ser repetido).
        #[arg(long = "photo")]
        photos: Vec<String>,
    },

    /// Executa a demonstração embutida do fluxo completo.
    Demo {
        /// Número de lotes simulados.
        #[arg(long, default_value_t = 5)]
        batches: usize,

        /// Lote que simula um captcha na publicação.
        #[arg(long, default_value = "batch_3")]
        captcha: String,
    },

    /// Mostra a tabela de transições permitidas.
    Edges,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_validate_subcommand() {
        let cli = Cli::parse_from(["carflow", "validate", "ai.json", "--mapping"]);
        match cli.command {
            Command::Validate { file, mapping } => {
                assert_eq!(file, PathBuf::from("ai.json"));
                assert!(mapping);
            }
            _ => panic!("expected Validate command"),
        }
        assert_eq!(cli.config, PathBuf::from("carflow.toml"));
    }

    #[test]
    fn cli_parses_repeated_photos() {
        let cli = Cli::parse_from(["carflow", "map", "ai.json", "--photo", "a.jpg", "--photo", "b.jpg"]);
        match cli.command {
            Command::Map { photos, .. } => assert_eq!(photos, vec!["a.jpg", "b.jpg"]),
            _ => panic!("expected Map command"),
        }
    }

    #[test]
    fn cli_parses_global_flags() {
        let cli = Cli::parse_from(["carflow", "--config", "/etc/carflow.toml", "--verbose", "demo", "--batches", "2"]);
        assert!(cli.verbose);
        assert_eq!(cli.config, PathBuf::from("/etc/carflow.toml"));
        match cli.command {
            Command::Demo { batches, captcha } => {
                assert_eq!(batches, 2);
                assert_eq!(captcha, "batch_3");
            }
            _ => panic!("expected Demo command"),
        }
    }

    #[test]
    fn cli_verify() {
        Cli::command().debug_assert();
    }
}
