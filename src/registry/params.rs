use serde_json::{json, Map, Value};

use crate::models::tool::Tool;

/// The declared type of one tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Integer,
    Number,
    Boolean,
    Array,
    Object,
}

impl ParamType {
    /// Unknown declared types default to String, which passes values
    /// through unconverted.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "integer" => ParamType::Integer,
            "number" => ParamType::Number,
            "boolean" => ParamType::Boolean,
            "array" => ParamType::Array,
            "object" => ParamType::Object,
            _ => ParamType::String,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Integer => "integer",
            ParamType::Number => "number",
            ParamType::Boolean => "boolean",
            ParamType::Array => "array",
            ParamType::Object => "object",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub ty: ParamType,
    pub required: bool,
}

impl ParamSpec {
    pub fn required<S: Into<String>>(name: S, ty: ParamType) -> Self {
        ParamSpec {
            name: name.into(),
            ty,
            required: true,
        }
    }

    pub fn optional<S: Into<String>>(name: S, ty: ParamType) -> Self {
        ParamSpec {
            name: name.into(),
            ty,
            required: false,
        }
    }
}

/// A tool described as data: name, description and a flat parameter list.
///
/// This is the generic validating dispatcher behind both registry modes:
/// the descriptor is built once (hand-written or parsed from a remote
/// schema) and `prepare` validates and coerces arguments against it before
/// every call.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    pub fn new<N: Into<String>, D: Into<String>>(
        name: N,
        description: D,
        params: Vec<ParamSpec>,
    ) -> Self {
        ToolSpec {
            name: name.into(),
            description: description.into(),
            params,
        }
    }

    /// Parse a remote catalog entry's input schema into a descriptor.
    /// Schemas without properties yield a parameterless tool.
    pub fn from_schema<N: Into<String>, D: Into<String>>(
        name: N,
        description: D,
        schema: &Value,
    ) -> Self {
        let required: Vec<&str> = schema
            .get("required")
            .and_then(|r| r.as_array())
            .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
            .unwrap_or_default();

        let mut params = Vec::new();
        if let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) {
            for (param_name, info) in properties {
                let ty = info
                    .get("type")
                    .and_then(|t| t.as_str())
                    .map(ParamType::parse)
                    .unwrap_or(ParamType::String);
                params.push(ParamSpec {
                    name: param_name.clone(),
                    ty,
                    required: required.contains(&param_name.as_str()),
                });
            }
        }

        ToolSpec::new(name, description, params)
    }

    /// JSON schema advertised to the model
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        for param in &self.params {
            properties.insert(param.name.clone(), json!({"type": param.ty.as_str()}));
        }
        let required: Vec<&str> = self
            .params
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    pub fn to_tool(&self) -> Tool {
        Tool::new(&self.name, &self.description, self.input_schema())
    }

    /// Validate and coerce arguments against the descriptor.
    ///
    /// Null-valued arguments are dropped. Integer parameters are coerced
    /// (i64, whole floats, numeric strings); a failed conversion fails the
    /// call locally with a textual error. All other declared types, and any
    /// unknown keys, pass through unmodified. Missing required parameters
    /// fail the call locally.
    pub fn prepare(&self, arguments: Value) -> Result<Map<String, Value>, String> {
        let incoming = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(format!(
                    "tool '{}' expects a JSON object as arguments, got: {}",
                    self.name, other
                ))
            }
        };

        let mut prepared = Map::new();
        for (key, value) in incoming {
            if value.is_null() {
                continue;
            }
            let declared = self.params.iter().find(|p| p.name == key);
            match declared.map(|p| p.ty) {
                Some(ParamType::Integer) => {
                    let coerced = coerce_integer(&value).ok_or_else(|| {
                        format!(
                            "Type conversion error for parameter '{}': expected integer, got {}",
                            key, value
                        )
                    })?;
                    prepared.insert(key, json!(coerced));
                }
                // Unknown keys are forwarded unmodified, never rejected.
                _ => {
                    prepared.insert(key, value);
                }
            }
        }

        for param in self.params.iter().filter(|p| p.required) {
            if !prepared.contains_key(&param.name) {
                return Err(format!(
                    "Missing required parameter '{}' for tool '{}'",
                    param.name, self.name
                ));
            }
        }

        Ok(prepared)
    }
}

fn coerce_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Some(i)
            } else {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0)
                    .map(|f| f as i64)
            }
        }
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}
