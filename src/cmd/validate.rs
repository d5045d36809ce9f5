//! Validate command - surface return problems without running an analysis

use crate::cmd::{load_rates, read_return};
use crate::core::ValidationError;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    /// JSON file containing the tax return, or "-" for stdin
    #[arg(short, long, default_value = "-")]
    r#return: PathBuf,

    /// Rate table year (e.g., 2024)
    #[arg(short, long)]
    year: Option<u16>,

    /// Custom rate table JSON; overrides --year
    #[arg(long)]
    rates: Option<PathBuf>,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// A validation issue for output
#[derive(Debug, Clone, Serialize)]
struct ValidationIssue {
    #[serde(rename = "type")]
    issue_type: String,
    severity: String,
    message: String,
}

/// JSON output structure
#[derive(Debug, Serialize)]
struct ValidationOutput {
    year: u16,
    issue_count: usize,
    issues: Vec<ValidationIssue>,
}

impl ValidateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ret = read_return(&self.r#return)?;
        let rates = load_rates(self.year, self.rates.as_deref())?;

        let mut issues = Vec::new();
        if let Err(err) = ret.validate(&rates) {
            issues.push(ValidationIssue {
                issue_type: error_type_name(&err),
                severity: "error".to_string(),
                message: err.to_string(),
            });
        }

        // Soft advisories: the return is usable but the analysis will
        // carry reduced confidence
        if ret.taxpayer.filing_status.is_married() && ret.taxpayer.spouse.is_none() {
            issues.push(ValidationIssue {
                issue_type: "AmbiguousFilingStatus".to_string(),
                severity: "warning".to_string(),
                message: format!(
                    "{} status without spouse data; joint/separate comparison unavailable",
                    ret.taxpayer.filing_status
                ),
            });
        }
        for field in &ret.estimated_fields {
            issues.push(ValidationIssue {
                issue_type: "EstimatedField".to_string(),
                severity: "warning".to_string(),
                message: format!("{field} is an estimate, not a confirmed figure"),
            });
        }

        if self.json {
            self.print_json(&issues, rates.year)?;
        } else {
            self.print_text(&issues, rates.year);
        }

        // Exit with code 1 if issues found
        if !issues.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }

    fn print_text(&self, issues: &[ValidationIssue], year: u16) {
        println!();
        println!("VALIDATION RESULTS ({})", year);
        println!();

        if issues.is_empty() {
            println!("\u{2713} No issues found.");
        } else {
            println!("\u{26A0} {} issue(s) found:", issues.len());
            println!();

            for (i, issue) in issues.iter().enumerate() {
                println!(
                    "  {}. [{}] ({}) {}",
                    i + 1,
                    issue.issue_type,
                    issue.severity,
                    issue.message
                );
            }
            println!();
        }
    }

    fn print_json(&self, issues: &[ValidationIssue], year: u16) -> anyhow::Result<()> {
        let output = ValidationOutput {
            year,
            issue_count: issues.len(),
            issues: issues.to_vec(),
        };

        println!("{}", serde_json::to_string_pretty(&output)?);
        Ok(())
    }
}

fn error_type_name(err: &ValidationError) -> String {
    match err {
        ValidationError::NegativeAmount { .. } => "NegativeAmount",
        ValidationError::ChildrenExceedDependents { .. } => "ChildrenExceedDependents",
        ValidationError::SalaryWithoutScorp => "SalaryWithoutScorp",
        ValidationError::SalaryExceedsIncome { .. } => "SalaryExceedsIncome",
        ValidationError::ContributionOverLimit { .. } => "ContributionOverLimit",
        ValidationError::HsaWithoutEligibility => "HsaWithoutEligibility",
    }
    .to_string()
}
