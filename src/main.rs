use clap::{Parser, Subcommand};
use taxplan::cmd::{
    analyze::AnalyzeCommand, entity::EntityCommand, project::ProjectCommand,
    schema::SchemaCommand, summary::SummaryCommand, validate::ValidateCommand,
};

#[derive(Parser, Debug)]
#[command(
    name = "taxplan",
    version,
    about = "Tax liability calculator and optimization recommendation engine"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Liability breakdown for a return
    Summary(SummaryCommand),
    /// Ranked savings recommendations with an optimized liability
    Analyze(AnalyzeCommand),
    /// Compare business entity structures
    Entity(EntityCommand),
    /// Multi-year liability projection
    Project(ProjectCommand),
    /// Check a return for problems without running an analysis
    Validate(ValidateCommand),
    /// Print expected input formats
    Schema(SchemaCommand),
}

impl Command {
    fn exec(&self) -> anyhow::Result<()> {
        match self {
            Command::Summary(cmd) => cmd.exec(),
            Command::Analyze(cmd) => cmd.exec(),
            Command::Entity(cmd) => cmd.exec(),
            Command::Project(cmd) => cmd.exec(),
            Command::Validate(cmd) => cmd.exec(),
            Command::Schema(cmd) => cmd.exec(),
        }
    }
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::init();
    Cli::parse().command.exec()
}
