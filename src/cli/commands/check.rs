//! `check` command: report which external components are installed.

use console::style;

use crate::cli::helpers::install_instructions;
use crate::config::Config;
use crate::ocr::{LocatorConfig, TesseractEngine, ToolLocator, ToolStatus};

pub(super) fn cmd_check(config: &Config, language: Option<&str>) -> anyhow::Result<()> {
    let language = language.unwrap_or(config.language.as_str());
    let locator = ToolLocator::new(LocatorConfig::from_config(config));

    println!("\n{}", style("OCR Tool Status").bold());
    println!("{}", "-".repeat(50));

    let statuses = locator.check_tools();
    let mut missing: Vec<String> = Vec::new();

    for status in &statuses {
        print_status(status);
        if status.required && status.path.is_none() {
            missing.push(status.tool.to_string());
        }
    }

    let tesseract = statuses
        .iter()
        .find(|s| s.tool == crate::error::Tool::Tesseract)
        .and_then(|s| s.path.clone());

    println!("\n{}", style("Language Data:").cyan());

    let installed = match tesseract {
        Some(ref path) => match TesseractEngine::new(path).available_languages() {
            Ok(languages) => {
                println!("  {:<15} {}", "installed", languages.join(", "));
                languages
            }
            Err(e) => {
                println!("  {:<15} {}", "installed", style(e.to_string()).red());
                Vec::new()
            }
        },
        None => Vec::new(),
    };

    // "ben+eng" needs both models.
    for part in language.split('+').filter(|p| !p.is_empty()) {
        let traineddata = locator.find_traineddata(tesseract.as_deref(), part);
        let listed = installed.iter().any(|l| l == part);

        match (listed, traineddata) {
            (_, Some(path)) => println!(
                "  {:<15} {} {}",
                part,
                style("✓ found").green(),
                style(path.display()).dim()
            ),
            (true, None) => println!("  {:<15} {}", part, style("✓ found").green()),
            (false, None) => {
                println!("  {:<15} {}", part, style("✗ not found").red());
                missing.push(format!("{}.traineddata", part));
            }
        }
    }

    println!();

    if missing.is_empty() {
        println!(
            "{} All components for '{}' are available",
            style("✓").green(),
            language
        );
        return Ok(());
    }

    println!(
        "{} Some components are missing. Install them manually:\n",
        style("!").yellow()
    );
    for line in install_instructions(std::env::consts::OS) {
        println!("  {}", line);
    }
    println!(
        "\n  Then run {} again to verify.",
        style("bangla-pdf-ocr check").bold()
    );

    anyhow::bail!("Missing required components: {}", missing.join(", "))
}

fn print_status(status: &ToolStatus) {
    let label = status.tool.as_str();
    match status.path {
        Some(ref path) => println!(
            "  {:<15} {} {}",
            label,
            style("✓ found").green(),
            style(path.display()).dim()
        ),
        None if status.required => println!("  {:<15} {}", label, style("✗ not found").red()),
        None => println!(
            "  {:<15} {}",
            label,
            style("○ not found (optional)").yellow()
        ),
    }
}
