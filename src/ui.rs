//! Interface de terminal do carflow: spinner e saída colorida.
//!
//! Usa as crates `indicatif` para o spinner da execução de demonstração e
//! `console` para estilizar achados de validação, resumos e a tabela de
//! transições.

use console::Style;
use indicatif::{ProgressBar, ProgressStyle};

use crate::pipeline::RunSummary;
use crate::schema::{Severity, ValidationError, ValidationResult};
use crate::state_machine::{EdgeKind, Status, TransitionGuard};

/// Indicador visual de progresso para uma execução do fluxo.
///
/// Exibe um spinner animado enquanto os lotes são processados e, ao final,
/// um resumo colorido por status.
pub struct FlowProgress {
    // Spinner do indicatif.
    pb: ProgressBar,
    green: Style,
    red: Style,
    yellow: Style,
}

impl FlowProgress {
    /// Inicia o spinner com a descrição da execução.
    pub fn start(description: &str) -> Self {
        let pb = ProgressBar::new_spinner();
        let style = ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        pb.set_style(style);
        pb.set_message(description.to_string());
        pb.enable_steady_tick(std::time::Duration::from_millis(100));

        Self {
            pb,
            green: Style::new().green().bold(),
            red: Style::new().red().bold(),
            yellow: Style::new().yellow(),
        }
    }

    /// Finaliza o spinner e imprime o resultado de cada cartão.
    pub fn complete(&self, summary: &RunSummary) {
        self.pb.finish_and_clear();
        for (id, status) in &summary.outcomes {
            println!("  {} {id} {status}", self.marker(*status));
        }
        println!(
            "  {} posted, {} need action, {} failed, {} skipped",
            self.green.apply_to(summary.count(Status::Posted)),
            self.yellow.apply_to(summary.count(Status::NeedAction)),
            self.red.apply_to(summary.count(Status::Failed)),
            summary.skipped_batches,
        );
    }

    fn marker(&self, status: Status) -> console::StyledObject<&'static str> {
        match status {
            Status::Posted => self.green.apply_to("✓"),
            Status::Failed => self.red.apply_to("✗"),
            _ => self.yellow.apply_to("!"),
        }
    }
}

/// Imprime os achados de uma validação; bloqueantes em vermelho, avisos em amarelo.
pub fn print_validation(result: &ValidationResult) {
    let green = Style::new().green().bold();
    if result.is_valid() {
        println!("{} valid", green.apply_to("✓"));
    } else {
        println!(
            "{} invalid ({} errors)",
            Style::new().red().bold().apply_to("✗"),
            result.errors().len()
        );
    }
    for finding in result.errors().iter().chain(result.warnings()) {
        print_finding(finding);
    }
}

fn print_finding(finding: &ValidationError) {
    let (label, style) = match finding.severity() {
        Severity::Blocking => ("error", Style::new().red()),
        Severity::Warning => ("warning", Style::new().yellow()),
    };
    println!("  {} {finding}", style.apply_to(format!("{label}:")));
}

/// Imprime a tabela de transições: avanços, retomadas e escalonamentos.
pub fn print_edges() {
    let cyan = Style::new().cyan();
    let dim = Style::new().dim();
    for from in Status::ALL {
        for to in Status::ALL {
            let kind = match TransitionGuard::edge(from, to) {
                Some(EdgeKind::Forward) => "forward",
                Some(EdgeKind::Resume) => "resume",
                _ => continue,
            };
            println!("  {from} → {to} {}", cyan.apply_to(kind));
        }
    }
    println!(
        "  {}",
        dim.apply_to("any status → NEED_ACTION | FAILED (escalation)")
    );
}
