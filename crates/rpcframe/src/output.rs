use std::collections::BTreeMap;
use std::io::{IsTerminal, Write};

use clap::ValueEnum;
use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use rpcframe_protocol::{Datum, DeclaredTypes, EnumValue, Value};
use serde::Serialize;
use serde_json::{Map, Number, Value as Json};

#[derive(Clone, Debug, Copy, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Pretty,
}

impl OutputFormat {
    pub fn default_for_stdout() -> Self {
        if std::io::stdout().is_terminal() {
            Self::Table
        } else {
            Self::Json
        }
    }
}

/// One decoded argument or result.
#[derive(Debug, Serialize)]
pub struct FieldReport {
    pub name: String,
    pub kind: String,
    pub value: Json,
    #[serde(skip)]
    pub display: String,
}

/// Structured view of a decoded request or response.
#[derive(Debug, Default, Serialize)]
pub struct MessageReport {
    pub frame: &'static str,
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub valid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub fields: Vec<FieldReport>,
}

#[derive(Serialize)]
struct ValuesOutput<'a> {
    size: usize,
    count: usize,
    values: &'a [Json],
}

pub fn print_values(values: &[Value], size: usize, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            let json: Vec<Json> = values.iter().map(value_to_json).collect();
            let out = ValuesOutput {
                size,
                count: values.len(),
                values: &json,
            };
            println!(
                "{}",
                serde_json::to_string(&out).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut table = Table::new();
            table
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["#", "TYPE", "VALUE"]);
            for (index, value) in values.iter().enumerate() {
                table.add_row(vec![
                    index.to_string(),
                    value.type_name().to_string(),
                    value.to_string(),
                ]);
            }
            println!("{table}");
        }
        OutputFormat::Pretty => {
            for (index, value) in values.iter().enumerate() {
                println!("{index:>4}  {:<8} {value}", value.type_name());
            }
        }
    }
}

pub fn print_message(report: &MessageReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string())
            );
        }
        OutputFormat::Table => {
            let mut summary = Table::new();
            summary
                .load_preset(UTF8_FULL)
                .set_content_arrangement(ContentArrangement::Dynamic)
                .set_header(vec!["FRAME", "SIZE", "METHOD", "TAGS", "STATUS"])
                .add_row(vec![
                    report.frame.to_string(),
                    report.size.to_string(),
                    report.method.clone().unwrap_or_else(|| "-".to_string()),
                    format_tags(&report.tags),
                    status(report),
                ]);
            println!("{summary}");

            if !report.fields.is_empty() {
                let mut fields = Table::new();
                fields
                    .load_preset(UTF8_FULL)
                    .set_content_arrangement(ContentArrangement::Dynamic)
                    .set_header(vec!["NAME", "KIND", "VALUE"]);
                for field in &report.fields {
                    fields.add_row(vec![
                        field.name.clone(),
                        field.kind.clone(),
                        field.display.clone(),
                    ]);
                }
                println!("{fields}");
            }
        }
        OutputFormat::Pretty => {
            print!("{} size={}", report.frame, report.size);
            if let Some(method) = &report.method {
                print!(" method={method}");
            }
            if !report.tags.is_empty() {
                print!(" tags={}", format_tags(&report.tags));
            }
            println!(" status={}", status(report));
            for field in &report.fields {
                println!("  {} ({}) = {}", field.name, field.kind, field.display);
            }
        }
    }
}

pub fn print_raw(data: &[u8]) {
    let mut out = std::io::stdout();
    let _ = out.write_all(data);
    let _ = out.flush();
}

fn status(report: &MessageReport) -> String {
    match (&report.valid, &report.error) {
        (_, Some(message)) => format!("error: {message}"),
        (Some(false), None) => "error".to_string(),
        _ => "ok".to_string(),
    }
}

fn format_tags(tags: &BTreeMap<String, String>) -> String {
    if tags.is_empty() {
        return "-".to_string();
    }
    tags.iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(",")
}

pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Nil => Json::Null,
        Value::Boolean(b) => Json::Bool(*b),
        Value::Integer(n) => Json::from(*n),
        Value::UInteger(n) => Json::from(*n),
        Value::F32(n) => float_to_json(f64::from(*n)),
        Value::F64(n) => float_to_json(*n),
        Value::String(s) => Json::String(s.clone()),
        Value::Binary(bytes) => Json::String(hex(bytes)),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(entries) => entries_to_json(
            entries
                .iter()
                .map(|(key, value)| (key.as_str(), value_to_json(key), value_to_json(value))),
        ),
    }
}

/// Convert a datum, spelling enum ordinals as variant names where `types` knows them.
pub fn datum_to_json(datum: &Datum, types: &dyn DeclaredTypes) -> Json {
    match datum {
        Datum::Null => Json::Null,
        Datum::Primitive(value) => value_to_json(value),
        Datum::Enum(value) => Json::String(enum_label(value, types)),
        Datum::Model(model) => {
            let mut object = Map::new();
            object.insert("$type".to_string(), Json::String(model.type_name.clone()));
            for (name, value) in &model.properties {
                let json = match value {
                    Some(value) => datum_to_json(value, types),
                    None => Json::Null,
                };
                object.insert(name.clone(), json);
            }
            Json::Object(object)
        }
        Datum::List(items) => Json::Array(
            items
                .iter()
                .map(|item| datum_to_json(item, types))
                .collect(),
        ),
        Datum::Map(entries) => entries_to_json(entries.iter().map(|(key, value)| {
            let name = match key {
                Datum::Primitive(Value::String(s)) => Some(s.as_str()),
                _ => None,
            };
            (name, datum_to_json(key, types), datum_to_json(value, types))
        })),
    }
}

pub fn enum_label(value: &EnumValue, types: &dyn DeclaredTypes) -> String {
    let known = types.resolve_discriminant(&value.type_name).and_then(|id| {
        let name = types.resolve_type_name(id)?;
        Some((name, types.enum_variant(id, value.ordinal)?))
    });
    match known {
        Some((name, variant)) => format!("{name}.{variant}"),
        None => format!("{}({})", value.type_name, value.ordinal),
    }
}

/// String-keyed maps become JSON objects; anything else a list of `[key, value]` pairs.
fn entries_to_json<'a, I>(entries: I) -> Json
where
    I: Iterator<Item = (Option<&'a str>, Json, Json)>,
{
    let entries: Vec<_> = entries.collect();
    if entries.iter().all(|(name, _, _)| name.is_some()) {
        let mut object = Map::new();
        for (name, _, value) in entries {
            if let Some(name) = name {
                object.insert(name.to_string(), value);
            }
        }
        Json::Object(object)
    } else {
        Json::Array(
            entries
                .into_iter()
                .map(|(_, key, value)| Json::Array(vec![key, value]))
                .collect(),
        )
    }
}

fn float_to_json(n: f64) -> Json {
    Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rpcframe_protocol::{ModelValue, TypeRegistry};

    #[test]
    fn string_keyed_maps_become_objects() {
        let value = Value::Map(vec![(Value::from("a"), Value::from(1i64))]);
        assert_eq!(value_to_json(&value), serde_json::json!({"a": 1}));
    }

    #[test]
    fn other_maps_become_pairs() {
        let value = Value::Map(vec![(Value::from(1i64), Value::from(true))]);
        assert_eq!(value_to_json(&value), serde_json::json!([[1, true]]));
    }

    #[test]
    fn binary_is_hex() {
        assert_eq!(
            value_to_json(&Value::Binary(vec![0xde, 0xad])),
            serde_json::json!("dead")
        );
    }

    #[test]
    fn models_and_enums_use_registry_names() {
        let mut registry = TypeRegistry::new();
        registry.register_enum("Color", ["Red", "Green"]);
        registry.register_model("Point");

        let datum = Datum::Model(
            ModelValue::new("Point")
                .with_property("x", 3i64)
                .with_property("color", EnumValue::new("Color", 1))
                .with_null("label"),
        );
        assert_eq!(
            datum_to_json(&datum, &registry),
            serde_json::json!({"$type": "Point", "x": 3, "color": "Color.Green", "label": null})
        );
    }

    #[test]
    fn unknown_enum_falls_back_to_ordinal() {
        let registry = TypeRegistry::new();
        assert_eq!(enum_label(&EnumValue::new("Mode", 4), &registry), "Mode(4)");
    }
}
