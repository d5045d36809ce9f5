//! Analyze command - the full ranked recommendation plan

use crate::cmd::{load_rates, read_return};
use crate::core::{analyze, ComprehensiveRecommendation};
use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;
use std::io;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct AnalyzeCommand {
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

    /// Output recommendations as CSV
    #[arg(long)]
    csv: bool,
}

impl AnalyzeCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ret = read_return(&self.r#return)?;
        let rates = load_rates(self.year, self.rates.as_deref())?;
        let plan = analyze(&ret, &rates)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&plan)?);
            Ok(())
        } else if self.csv {
            self.write_csv(&plan)
        } else {
            self.print_plan(&plan);
            Ok(())
        }
    }

    fn print_plan(&self, plan: &ComprehensiveRecommendation) {
        println!();
        println!("RECOMMENDATIONS ({})", plan.year);
        println!();
        println!(
            "Current liability:    {}",
            format_usd_signed(plan.current.total_liability)
        );
        println!(
            "Optimized liability:  {}",
            format_usd_signed(plan.optimized.total_liability)
        );
        println!(
            "Addressable savings:  {}",
            format_usd_signed(plan.total_addressable_savings)
        );
        println!();

        if plan.recommendations.is_empty() {
            println!("No savings opportunities found.");
            return;
        }

        let rows: Vec<RecommendationRow> = plan
            .recommendations
            .iter()
            .enumerate()
            .map(|(i, rec)| RecommendationRow {
                priority: (i + 1).to_string(),
                category: rec.category.to_string(),
                title: rec.title.clone(),
                savings: format_usd_signed(rec.estimated_savings),
                confidence: format!("{:.0}%", rec.confidence * dec!(100)),
                complexity: rec.complexity.to_string(),
                reference: rec.irs_reference.clone(),
            })
            .collect();

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        println!();

        println!("NOTES");
        for (i, rec) in plan.recommendations.iter().enumerate() {
            println!("  {}. {}", i + 1, rec.note);
            if let Some([low, high]) = rec.savings_range {
                println!(
                    "     Estimated range: {} to {}",
                    format_usd_signed(low),
                    format_usd_signed(high)
                );
            }
            if rec.ambiguous {
                println!("     \u{26A0} Needs more data to confirm eligibility.");
            }
        }
        println!();
    }

    fn write_csv(&self, plan: &ComprehensiveRecommendation) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_writer(io::stdout());
        for (i, rec) in plan.recommendations.iter().enumerate() {
            wtr.serialize(RecommendationCsvRow {
                priority: i + 1,
                category: rec.category.to_string(),
                title: rec.title.clone(),
                estimated_savings: format!("{:.2}", rec.estimated_savings),
                confidence: format!("{:.4}", rec.confidence),
                complexity: rec.complexity.to_string(),
                irs_reference: rec.irs_reference.clone(),
                source: rec.source.clone(),
                fields: rec
                    .fields
                    .iter()
                    .map(|f| f.path())
                    .collect::<Vec<_>>()
                    .join(";"),
                note: rec.note.clone(),
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Tabled)]
struct RecommendationRow {
    #[tabled(rename = "#")]
    priority: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Recommendation")]
    title: String,
    #[tabled(rename = "Est. Savings")]
    savings: String,
    #[tabled(rename = "Confidence")]
    confidence: String,
    #[tabled(rename = "Complexity")]
    complexity: String,
    #[tabled(rename = "Reference")]
    reference: String,
}

#[derive(Debug, Serialize)]
struct RecommendationCsvRow {
    priority: usize,
    category: String,
    title: String,
    estimated_savings: String,
    confidence: String,
    complexity: String,
    irs_reference: String,
    source: String,
    fields: String,
    note: String,
}

fn format_usd_signed(amount: Decimal) -> String {
    if amount < Decimal::ZERO {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${:.2}", amount)
    }
}
