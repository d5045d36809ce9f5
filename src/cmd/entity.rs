//! Entity command - compare business structures for the return

use crate::cmd::{load_rates, read_return};
use crate::core::{optimize_with, EntityAnalysis};
use clap::Args;
use rust_decimal::Decimal;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct EntityCommand {
    /// JSON file containing the tax return, or "-" for stdin
    #[arg(short, long, default_value = "-")]
    r#return: PathBuf,

    /// Rate table year (e.g., 2024)
    #[arg(short, long)]
    year: Option<u16>,

    /// Custom rate table JSON; overrides --year
    #[arg(long)]
    rates: Option<PathBuf>,

    /// Extra S-corp salary to evaluate; repeatable
    #[arg(short, long)]
    salary: Vec<Decimal>,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

impl EntityCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ret = read_return(&self.r#return)?;
        let rates = load_rates(self.year, self.rates.as_deref())?;
        let analysis = optimize_with(&ret, &rates, &self.salary)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&analysis)?);
        } else {
            self.print_analysis(&analysis);
        }
        Ok(())
    }

    fn print_analysis(&self, analysis: &EntityAnalysis) {
        println!();
        println!("ENTITY STRUCTURE COMPARISON");
        println!();

        let rows: Vec<OptionRow> = analysis
            .options
            .iter()
            .enumerate()
            .map(|(i, opt)| {
                let mut marks = Vec::new();
                if i == analysis.current {
                    marks.push("current");
                }
                if i == analysis.best {
                    marks.push("best");
                }
                if opt.below_salary_floor {
                    marks.push("below salary floor");
                }
                OptionRow {
                    entity: opt.entity_type.to_string(),
                    salary: opt
                        .salary
                        .map(format_usd_signed)
                        .unwrap_or_else(|| "-".to_string()),
                    liability: format_usd_signed(opt.breakdown.total_liability),
                    overhead: format_usd_signed(opt.overhead),
                    total_cost: format_usd_signed(opt.total_cost()),
                    notes: marks.join(", "),
                }
            })
            .collect();

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        println!();

        println!(
            "Savings vs current:   {}",
            format_usd_signed(analysis.savings_vs_current)
        );
        println!(
            "QBI deduction change: {}",
            format_usd_signed(analysis.qbi_change)
        );
        match analysis.breakeven_salary {
            Some(salary) => println!("Breakeven salary:     {}", format_usd_signed(salary)),
            None => println!("Breakeven salary:     no crossing in the salary range"),
        }
        println!();
    }
}

#[derive(Debug, Clone, Tabled)]
struct OptionRow {
    #[tabled(rename = "Entity")]
    entity: String,
    #[tabled(rename = "Salary")]
    salary: String,
    #[tabled(rename = "Liability")]
    liability: String,
    #[tabled(rename = "Overhead")]
    overhead: String,
    #[tabled(rename = "Total Cost")]
    total_cost: String,
    #[tabled(rename = "Notes")]
    notes: String,
}

fn format_usd_signed(amount: Decimal) -> String {
    if amount < Decimal::ZERO {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${:.2}", amount)
    }
}
