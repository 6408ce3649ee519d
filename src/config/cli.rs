use crate::domain::model::{AggregateKind, FilterSpec, Gender, Rating};
use crate::utils::error::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Text,
}

#[derive(Debug, Clone, Parser)]
#[command(name = "league-stats")]
#[command(about = "Player population statistics for the league dashboard")]
pub struct CliConfig {
    #[arg(long, short = 'c', help = "TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "Read the CSV dataset from this directory")]
    pub data_dir: Option<String>,

    #[arg(long, help = "Query a SQL-over-HTTP endpoint instead of CSV files")]
    pub endpoint: Option<String>,

    #[arg(long)]
    pub section: Option<String>,

    #[arg(long)]
    pub district: Option<String>,

    #[arg(long)]
    pub area: Option<String>,

    #[arg(long)]
    pub gender: Option<Gender>,

    #[arg(long)]
    pub rating: Option<Rating>,

    #[arg(long, help = "Filters as a query string, e.g. 'section=S1&gender=Male'")]
    pub query: Option<String>,

    #[arg(long, help = "Print one aggregate as {\"rows\": [...]}, e.g. 'by-district'")]
    pub aggregate: Option<AggregateKind>,

    #[arg(long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    #[arg(long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,
}

impl CliConfig {
    /// Filters from `--query`, overridden field by field by the explicit flags.
    pub fn filter_spec(&self) -> Result<FilterSpec> {
        let mut spec = match &self.query {
            Some(query) => FilterSpec::from_query(query)?,
            None => FilterSpec::new(),
        };
        if let Some(section) = &self.section {
            spec.section = Some(section.clone());
        }
        if let Some(district) = &self.district {
            spec.district = Some(district.clone());
        }
        if let Some(area) = &self.area {
            spec.area = Some(area.clone());
        }
        if self.gender.is_some() {
            spec.gender = self.gender;
        }
        if self.rating.is_some() {
            spec.rating = self.rating;
        }
        Ok(spec)
    }
}
