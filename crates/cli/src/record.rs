//! `testboard record` -- CRUD against the configured store, validated by the
//! compiled schema.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use testboard_schema::{SchemaRegistry, ShapeProvider};
use testboard_storage::{open_store, RecordStore, StoreUrl};

use crate::{RecordCommands, StoreArgs};

type CmdResult = Result<(), Box<dyn std::error::Error>>;

pub(crate) async fn cmd_record(command: RecordCommands) -> CmdResult {
    match command {
        RecordCommands::Add { store, data } => {
            let records = open(&store).await?;
            let record = records.insert(&store.kind, parse_fields(&data)?).await?;
            print_json(&record.to_value())
        }
        RecordCommands::Update { store, id, data } => {
            let records = open(&store).await?;
            let record = records.update(&store.kind, &id, parse_fields(&data)?).await?;
            print_json(&record.to_value())
        }
        RecordCommands::Delete { store, id } => {
            let records = open(&store).await?;
            records.delete(&store.kind, &id).await?;
            eprintln!("deleted {} {}", store.kind, id);
            Ok(())
        }
        RecordCommands::List { store } => {
            let records = open(&store).await?;
            let all: Vec<Value> = records
                .find_all(&store.kind)
                .await?
                .iter()
                .map(|r| r.to_value())
                .collect();
            print_json(&Value::Array(all))
        }
    }
}

async fn open(args: &StoreArgs) -> Result<Arc<dyn RecordStore>, Box<dyn std::error::Error>> {
    let registry: Arc<dyn ShapeProvider> = Arc::new(SchemaRegistry::open(&args.schema).await?);
    let url: StoreUrl = args.store.parse()?;
    Ok(open_store(&url, registry, Duration::from_millis(500)).await?)
}

fn parse_fields(data: &str) -> Result<Map<String, Value>, String> {
    match serde_json::from_str::<Value>(data) {
        Ok(Value::Object(fields)) => Ok(fields),
        Ok(_) => Err("--data must be a JSON object".to_string()),
        Err(e) => Err(format!("invalid --data JSON: {}", e)),
    }
}

fn print_json(value: &Value) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_must_be_an_object() {
        assert_eq!(parse_fields(r#"{"name":"x"}"#).unwrap().len(), 1);
        assert!(parse_fields("[1]").unwrap_err().contains("JSON object"));
        assert!(parse_fields("{").unwrap_err().contains("invalid"));
    }
}
