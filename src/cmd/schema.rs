//! Schema command - print expected input formats

use crate::core::{FieldPath, RateTable, TaxReturn};
use clap::Args;
use schemars::schema_for;

#[derive(Args, Debug)]
pub struct SchemaCommand {
    /// What to describe: return, rates or fields
    #[arg(value_enum, default_value = "return")]
    format: SchemaFormat,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum SchemaFormat {
    /// JSON Schema for the tax return input
    Return,
    /// JSON Schema for a custom rate table
    Rates,
    /// Scenario override field paths and their value types
    Fields,
}

impl SchemaCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        match self.format {
            SchemaFormat::Return => {
                let schema = schema_for!(TaxReturn);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            SchemaFormat::Rates => {
                let schema = schema_for!(RateTable);
                println!("{}", serde_json::to_string_pretty(&schema)?);
            }
            SchemaFormat::Fields => self.print_fields(),
        }
        Ok(())
    }

    fn print_fields(&self) {
        println!("Scenario Override Fields");
        println!("========================");
        println!();
        for field in FieldPath::all() {
            println!(
                "{:30} ({:6})  {}",
                field.path(),
                field.value_type(),
                field.description()
            );
        }
        println!();
        println!("Amounts are plain numbers; flags are true/false.");
    }
}
