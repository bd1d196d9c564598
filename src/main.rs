use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use dynproj::mapping::{load_configuration, load_default_configuration};
use dynproj::query::to_sql;
use dynproj::record::infer_shape;
use dynproj::{DynamicQueryable, MappingConfiguration, Query, Record, Shape, Value};
use tracing::{debug, info};

/// Filter, sort and project JSON rows with string expressions
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// JSON file holding an array of objects
    #[arg(long)]
    input: PathBuf,

    /// Source shape from the mapping file (inferred from the rows if omitted)
    #[arg(long)]
    shape: Option<String>,

    /// Destination shape that expression member names refer to
    #[arg(long = "as")]
    destination: Option<String>,

    /// Filter expression, e.g. "Age > @0"
    #[arg(long = "where")]
    predicate: Option<String>,

    /// Placeholder value as JSON (@0, @1, ... in order)
    #[arg(long = "arg")]
    args: Vec<String>,

    /// Ordering, e.g. "Age desc, Name"
    #[arg(long)]
    order_by: Option<String>,

    /// Projection, e.g. "new(Name, Age + 1 as NextAge)"
    #[arg(long)]
    select: Option<String>,

    /// Print the query as SQL against this table instead of running it
    #[arg(long)]
    sql: Option<String>,

    /// Mapping file (defaults to <config dir>/dynproj/mapping.toml)
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays parseable.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let output = run(&cli)?;
    println!("{}", output);
    Ok(())
}

fn run(cli: &Cli) -> Result<String> {
    if cli.sql.is_some() && cli.select.is_some() {
        bail!("--select cannot be combined with --sql");
    }

    let config = Arc::new(load_mapping(cli.config.as_ref())?);
    let text = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("cannot read {}", cli.input.display()))?;
    let rows = parse_rows(&text)?;
    let values = parse_args(&cli.args)?;

    let shape = match &cli.shape {
        Some(name) => Arc::clone(
            config
                .shape(name)
                .ok_or_else(|| anyhow!("shape '{}' is not defined in the mapping file", name))?,
        ),
        None => infer_shape("Row", &rows).into_shared(),
    };
    let destination: Option<Arc<Shape>> = match &cli.destination {
        Some(name) => Some(Arc::clone(config.shape(name).ok_or_else(|| {
            anyhow!("shape '{}' is not defined in the mapping file", name)
        })?)),
        None => None,
    };
    let destination = destination.as_deref();

    info!(rows = rows.len(), shape = shape.name(), "loaded input");
    let mut query = Query::from_vec(shape, rows);
    if let Some(predicate) = &cli.predicate {
        query = query.where_with(&config, destination, predicate, &values)?;
    }
    if let Some(ordering) = &cli.order_by {
        query = query.order_by_with(&config, destination, ordering, &values)?;
    }

    if let Some(table) = &cli.sql {
        return Ok(to_sql(&query, table)?);
    }

    let rows = match &cli.select {
        Some(projection) => query
            .select_with(&config, destination, projection, &values)?
            .execute()?,
        None => query.execute()?,
    };
    debug!(rows = rows.len(), "query finished");

    let json: Vec<serde_json::Value> = rows.iter().map(Record::to_json).collect();
    Ok(serde_json::to_string_pretty(&json)?)
}

fn load_mapping(path: Option<&PathBuf>) -> Result<MappingConfiguration> {
    let config = match path {
        Some(path) => load_configuration(path)?,
        None => load_default_configuration()?.unwrap_or_default(),
    };
    config.assert_valid()?;
    Ok(config)
}

fn parse_rows(text: &str) -> Result<Vec<Record>> {
    let json: serde_json::Value = serde_json::from_str(text).context("input is not valid JSON")?;
    let items = json
        .as_array()
        .ok_or_else(|| anyhow!("input must be a JSON array of objects"))?;
    Ok(items
        .iter()
        .map(Record::from_json)
        .collect::<dynproj::Result<Vec<_>>>()?)
}

fn parse_args(args: &[String]) -> Result<Vec<Value>> {
    args.iter()
        .map(|arg| {
            // Bare words are taken as strings so `--arg Ann` works unquoted.
            let json = serde_json::from_str(arg)
                .unwrap_or_else(|_| serde_json::Value::String(arg.clone()));
            Ok(Value::from_json(&json)?)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// A file in the temp directory, removed when dropped.
    struct TempFile {
        path: PathBuf,
    }

    impl TempFile {
        fn arg(&self) -> &str {
            self.path.to_str().unwrap()
        }
    }

    impl Drop for TempFile {
        fn drop(&mut self) {
            let _ = std::fs::remove_file(&self.path);
        }
    }

    fn write_temp(name: &str, contents: &str) -> TempFile {
        let path = std::env::temp_dir().join(format!("dynproj-{}-{}", std::process::id(), name));
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        TempFile { path }
    }

    const ROWS: &str = r#"[
        {"Name": "B", "Age": 30},
        {"Name": "A", "Age": 30},
        {"Name": "C", "Age": 20}
    ]"#;

    const MAPPING: &str = r#"
[shapes.Person]
Name = "string"
Age = "integer"

[shapes.PersonView]
Label = "string"
Age = "integer"

[[maps]]
source = "Person"
destination = "PersonView"
[maps.members]
Label = "Name"
"#;

    #[test]
    fn test_cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "dynproj", "--input", "rows.json", "--where", "Age > @0", "--arg", "18", "--arg",
            "\"x\"", "--order-by", "Age desc", "--as", "PersonView",
        ])
        .unwrap();
        assert_eq!(cli.predicate.as_deref(), Some("Age > @0"));
        assert_eq!(cli.args, vec!["18", "\"x\""]);
        assert_eq!(cli.destination.as_deref(), Some("PersonView"));
        assert!(cli.select.is_none());
    }

    #[test]
    fn test_cli_requires_input() {
        assert!(Cli::try_parse_from(["dynproj", "--where", "Age > 1"]).is_err());
    }

    #[test]
    fn test_parse_args() {
        let values = parse_args(&["18".into(), "\"Ann\"".into(), "Bob".into(), "null".into()]).unwrap();
        assert_eq!(
            values,
            vec![
                Value::Integer(18),
                Value::from("Ann"),
                Value::from("Bob"),
                Value::Null
            ]
        );
        assert!(parse_args(&["[1]".into()]).is_err());
    }

    #[test]
    fn test_parse_rows_rejects_non_array() {
        assert!(parse_rows("{\"a\": 1}").is_err());
        assert_eq!(parse_rows(ROWS).unwrap().len(), 3);
    }

    #[test]
    fn test_run_filters_and_sorts() {
        let input = write_temp("rows-sort.json", ROWS);
        let mapping = write_temp("mapping-sort.toml", "");
        let cli = Cli::try_parse_from([
            "dynproj",
            "--input",
            input.arg(),
            "--config",
            mapping.arg(),
            "--where",
            "Age > @0",
            "--arg",
            "18",
            "--order-by",
            "Age desc, Name",
        ])
        .unwrap();
        let out: serde_json::Value = serde_json::from_str(&run(&cli).unwrap()).unwrap();
        let names: Vec<&str> = out
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["Name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["A", "B"]);
    }

    #[test]
    fn test_run_projected_select() {
        let input = write_temp("rows-select.json", ROWS);
        let mapping = write_temp("mapping-select.toml", MAPPING);
        let cli = Cli::try_parse_from([
            "dynproj",
            "--input",
            input.arg(),
            "--config",
            mapping.arg(),
            "--shape",
            "Person",
            "--as",
            "PersonView",
            "--where",
            "Label != 'B'",
            "--select",
            "new(Label, Age)",
        ])
        .unwrap();
        let out: serde_json::Value = serde_json::from_str(&run(&cli).unwrap()).unwrap();
        assert_eq!(
            out,
            serde_json::json!([{"Label": "A", "Age": 30}, {"Label": "C", "Age": 20}])
        );
    }

    #[test]
    fn test_run_renders_sql() {
        let input = write_temp("rows-sql.json", ROWS);
        let mapping = write_temp("mapping-sql.toml", "");
        let cli = Cli::try_parse_from([
            "dynproj",
            "--input",
            input.arg(),
            "--config",
            mapping.arg(),
            "--where",
            "Age >= 21",
            "--sql",
            "people",
        ])
        .unwrap();
        assert_eq!(
            run(&cli).unwrap(),
            "SELECT * FROM \"people\" WHERE COALESCE((\"Age\" >= 21), FALSE)"
        );
    }

    #[test]
    fn test_temp_files_are_removed() {
        let file = write_temp("rows-cleanup.json", ROWS);
        let path = file.path.clone();
        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn test_sql_and_select_conflict() {
        let cli = Cli::try_parse_from([
            "dynproj", "--input", "x.json", "--sql", "t", "--select", "Name",
        ])
        .unwrap();
        assert!(run(&cli).is_err());
    }
}
