//! Project command - multi-year liability outlook

use crate::cmd::{read_return, DEFAULT_YEAR};
use crate::core::{project, Projection, ProjectionAssumptions, RateTable, RothLadder};
use anyhow::Context;
use clap::Args;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use tabled::{
    settings::{object::Rows, Alignment, Modify, Style},
    Table, Tabled,
};

#[derive(Args, Debug)]
pub struct ProjectCommand {
    /// JSON file containing the tax return, or "-" for stdin
    #[arg(short, long, default_value = "-")]
    r#return: PathBuf,

    /// First projected year
    #[arg(short, long)]
    year: Option<u16>,

    /// Custom rate table JSON, applied to every projected year
    #[arg(long)]
    rates: Option<PathBuf>,

    /// Horizon length in years
    #[arg(long, default_value = "5")]
    years: u32,

    /// Annual income growth, e.g. 0.03 for 3%
    #[arg(short, long, default_value = "0.03")]
    growth: Decimal,

    /// Annual growth of itemizable deductions; defaults to --growth
    #[arg(long)]
    deduction_growth: Option<Decimal>,

    /// Traditional balance to convert through a Roth ladder
    #[arg(long, value_name = "BALANCE")]
    roth_ladder: Option<Decimal>,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,

    /// Output projected years as CSV
    #[arg(long)]
    csv: bool,
}

impl ProjectCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let ret = read_return(&self.r#return)?;
        let start = self.year.unwrap_or(DEFAULT_YEAR);
        let assumptions = ProjectionAssumptions {
            start_year: start,
            years: self.years,
            income_growth: self.growth,
            deduction_growth: self.deduction_growth.unwrap_or(self.growth),
            roth: self.roth_ladder.map(|traditional_balance| RothLadder {
                traditional_balance,
            }),
        };
        // Bounds-check the horizon before a table is built for each year
        assumptions.validate()?;
        let tables = self.build_tables(start)?;
        let projection = project(&ret, &tables, &assumptions)?;

        if self.json {
            println!("{}", serde_json::to_string_pretty(&projection)?);
            Ok(())
        } else if self.csv {
            self.write_csv(&projection)
        } else {
            self.print_projection(&projection);
            Ok(())
        }
    }

    /// One table per projected year. Years beyond the published tables
    /// reuse the newest one, re-keyed, with a warning.
    fn build_tables(&self, start: u16) -> anyhow::Result<BTreeMap<u16, RateTable>> {
        let mut tables = BTreeMap::new();

        if let Some(path) = &self.rates {
            let file =
                File::open(path).with_context(|| format!("opening {}", path.display()))?;
            let base = RateTable::load_json(BufReader::new(file))?;
            for offset in 0..self.years {
                let year = start + offset as u16;
                let mut table = base.clone();
                table.year = year;
                tables.insert(year, table);
            }
            return Ok(tables);
        }

        let mut newest: Option<RateTable> = None;
        for offset in 0..self.years {
            let year = start + offset as u16;
            let table = match RateTable::for_year(year) {
                Ok(table) => {
                    newest = Some(table.clone());
                    table
                }
                Err(_) => match &newest {
                    Some(base) => {
                        log::warn!(
                            "no built-in rate table for {year}; reusing {} constants",
                            base.year
                        );
                        let mut table = base.clone();
                        table.year = year;
                        table
                    }
                    None => anyhow::bail!(
                        "no built-in rate table for {year}; pass --rates or start from {:?}",
                        RateTable::supported_years()
                    ),
                },
            };
            tables.insert(year, table);
        }
        Ok(tables)
    }

    fn print_projection(&self, projection: &Projection) {
        println!();
        println!("PROJECTION ({} years)", projection.years.len());
        println!();

        let rows: Vec<YearRow> = projection
            .years
            .iter()
            .map(|yr| YearRow {
                year: yr.year.to_string(),
                agi: format_usd_signed(yr.breakdown.agi),
                taxable: format_usd_signed(yr.breakdown.taxable_income),
                tax: format_usd_signed(yr.breakdown.total_liability),
                converted: format_usd_signed(yr.roth_converted),
                combined: format_usd_signed(yr.combined_liability),
                cumulative: format_usd_signed(yr.cumulative_liability),
            })
            .collect();

        let table = Table::new(rows)
            .with(Style::rounded())
            .with(Modify::new(Rows::new(1..)).with(Alignment::right()))
            .to_string();
        println!("{}", table);
        println!();

        println!(
            "Total liability:   {}",
            format_usd_signed(projection.total_liability)
        );
        if projection.total_converted > Decimal::ZERO
            || projection.remaining_balance > Decimal::ZERO
        {
            println!(
                "Total converted:   {}",
                format_usd_signed(projection.total_converted)
            );
            println!(
                "Remaining balance: {}",
                format_usd_signed(projection.remaining_balance)
            );
        }
        println!();
    }

    fn write_csv(&self, projection: &Projection) -> anyhow::Result<()> {
        let mut wtr = csv::Writer::from_writer(io::stdout());
        for yr in &projection.years {
            wtr.serialize(YearCsvRow {
                year: yr.year,
                agi: format!("{:.2}", yr.breakdown.agi),
                taxable_income: format!("{:.2}", yr.breakdown.taxable_income),
                total_liability: format!("{:.2}", yr.breakdown.total_liability),
                roth_converted: format!("{:.2}", yr.roth_converted),
                conversion_tax: format!("{:.2}", yr.conversion_tax),
                combined_liability: format!("{:.2}", yr.combined_liability),
                cumulative_liability: format!("{:.2}", yr.cumulative_liability),
            })?;
        }
        wtr.flush()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Tabled)]
struct YearRow {
    #[tabled(rename = "Year")]
    year: String,
    #[tabled(rename = "AGI")]
    agi: String,
    #[tabled(rename = "Taxable")]
    taxable: String,
    #[tabled(rename = "Tax")]
    tax: String,
    #[tabled(rename = "Converted")]
    converted: String,
    #[tabled(rename = "Combined")]
    combined: String,
    #[tabled(rename = "Cumulative")]
    cumulative: String,
}

#[derive(Debug, Serialize)]
struct YearCsvRow {
    year: u16,
    agi: String,
    taxable_income: String,
    total_liability: String,
    roth_converted: String,
    conversion_tax: String,
    combined_liability: String,
    cumulative_liability: String,
}

fn format_usd_signed(amount: Decimal) -> String {
    if amount < Decimal::ZERO {
        format!("-${:.2}", amount.abs())
    } else {
        format!("${:.2}", amount)
    }
}
