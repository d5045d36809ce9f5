//! Summary command - single-year liability breakdown

use crate::cmd::{load_rates, read_return};
use crate::core::{calculate, LiabilityBreakdown};
use clap::Args;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct SummaryCommand {
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

impl SummaryCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ret = read_return(&self.r#return)?;
        let rates = load_rates(self.year, self.rates.as_deref())?;
        let breakdown = calculate(&ret, &rates)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&breakdown)?);
        } else {
            self.print_summary(&breakdown);
        }
        Ok(())
    }

    fn print_summary(&self, breakdown: &LiabilityBreakdown) {
        println!();
        println!(
            "TAX SUMMARY ({}, {})",
            breakdown.year, breakdown.filing_status
        );
        println!();

        let rows = vec![
            LineRow::new("Gross income", breakdown.gross_income),
            LineRow::new("Adjusted gross income", breakdown.agi),
            LineRow::new(
                format!("Deduction ({})", breakdown.deduction.kind),
                -breakdown.deduction.amount,
            ),
            LineRow::new("QBI deduction", -breakdown.qbi_deduction),
            LineRow::new("Taxable income", breakdown.taxable_income),
            LineRow::new("Ordinary income tax", breakdown.ordinary_tax),
            LineRow::new("Self-employment tax", breakdown.self_employment_tax),
            LineRow::new("Payroll tax (S-corp salary)", breakdown.payroll_tax),
            LineRow::new("Additional Medicare tax", breakdown.additional_medicare),
            LineRow::new("Alternative minimum tax", breakdown.amt),
            LineRow::new("Net investment income tax", breakdown.niit),
            LineRow::new(
                "Credits (nonrefundable)",
                -breakdown.credits.total_nonrefundable(),
            ),
            LineRow::new("Credits (refundable)", -breakdown.credits.refundable),
            LineRow::new("Total liability", breakdown.total_liability),
        ];

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        println!();
        println!(
            "Effective rate: {:.2}% | Marginal rate: {:.0}%",
            breakdown.effective_rate * dec!(100),
            breakdown.marginal_rate * dec!(100)
        );
        println!();
    }
}

#[derive(Debug, Clone, Tabled)]
struct LineRow {
    #[tabled(rename = "Line")]
    line: String,
    #[tabled(rename = "Amount")]
    amount: String,
}

impl LineRow {
    fn new(line: impl Into<String>, amount: Decimal) -> LineRow {
        LineRow {
            line: line.into(),
            amount: format_usd_signed(amount),
        }
    }
}

fn format_usd_signed(amount: Decimal) -> String {
    if amount < Decimal::ZERO {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${:.2}", amount)
    }
}
