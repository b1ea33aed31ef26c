//! Transformation executor - applies compiled rules to input documents.

use std::borrow::Cow;

use serde_json::{Map, Number, Value};

use crate::compiler::{CompiledSchema, MappingRule, RuleKind, Source};
use crate::error::TransformError;
use crate::path::{insert_at, Segment, SourcePath};
use crate::schema::{escape_pointer, Conditions};
use crate::types::{
    json_type_name, ErrorMode, KeyMapOutput, ScalarType, TransformOptions, ValueType,
};

/// Transform one input document.
///
/// The compiled schema is only read, so one schema can serve any number of
/// concurrent calls. Fields whose result is empty (null, blank strings,
/// empty objects or arrays) are left out of the output.
///
/// # Errors
///
/// With `ErrorMode::FailFast` the first field error is returned. With
/// `ErrorMode::CollectAll` failing fields are skipped and all of their errors
/// are returned together as `TransformError::Multiple`.
pub fn transform(
    schema: &CompiledSchema,
    input: &Value,
    options: &TransformOptions,
) -> Result<Value, TransformError> {
    let mut executor = Executor {
        schema,
        options,
        root: input,
        errors: Vec::new(),
        active: Vec::new(),
    };

    let mut output = Value::Object(Map::new());
    executor.apply_rules(schema.rules(), input, "", &mut output)?;

    if !executor.errors.is_empty() {
        return Err(TransformError::Multiple {
            errors: executor.errors,
        });
    }
    Ok(output)
}

struct Executor<'a> {
    schema: &'a CompiledSchema,
    options: &'a TransformOptions,
    root: &'a Value,
    errors: Vec<TransformError>,
    /// Recursive slots being applied, with the input pointer they entered at.
    active: Vec<(usize, String)>,
}

impl<'a> Executor<'a> {
    fn apply_rules(
        &mut self,
        rules: &[MappingRule],
        subject: &Value,
        pointer: &str,
        out: &mut Value,
    ) -> Result<(), TransformError> {
        for rule in rules {
            match self.apply(rule, subject, pointer) {
                Ok(Some(value)) => insert_at(out, &rule.target, value),
                Ok(None) => {}
                Err(err) => self.report(err)?,
            }
        }
        Ok(())
    }

    /// Record an error, or return it when failing fast.
    fn report(&mut self, err: TransformError) -> Result<(), TransformError> {
        match self.options.error_mode {
            ErrorMode::FailFast => Err(err),
            ErrorMode::CollectAll => {
                tracing::debug!(error = %err, "collected transform error");
                self.errors.push(err);
                Ok(())
            }
        }
    }

    fn apply(
        &mut self,
        rule: &MappingRule,
        subject: &Value,
        pointer: &str,
    ) -> Result<Option<Value>, TransformError> {
        tracing::trace!(schema_path = %rule.schema_path, pointer, "applying rule");

        let (value, at) = self.read(rule, subject, pointer)?;
        let Some(value) = value else {
            return self.missing(rule, at);
        };

        match &rule.kind {
            // Composite parts are coerced individually while being read
            RuleKind::Scalar if matches!(rule.source, Source::Composite { .. }) => {
                Ok(non_empty(value.into_owned()))
            }
            RuleKind::Scalar => self.coerce(rule, value.into_owned(), &at),
            RuleKind::Object { rules } => {
                if !value.is_object() {
                    return self.mismatch(rule, &value, &at);
                }
                let mut out = Value::Object(Map::new());
                self.apply_rules(rules, &value, &at, &mut out)?;
                Ok(non_empty(out))
            }
            RuleKind::Array {
                item,
                conditions,
                get_one,
            } => self.apply_array(
                rule,
                &value,
                &at,
                item.as_deref(),
                conditions.as_ref(),
                *get_one,
            ),
            RuleKind::KeyedObject { key_field, value: value_rule } => {
                self.apply_keyed(rule, &value, &at, key_field, value_rule)
            }
            RuleKind::Recursive { slot } => {
                let schema = self.schema;
                let Some(def_rule) = schema.recursive_rule(*slot) else {
                    return Ok(None);
                };
                let entry = (*slot, at.clone());
                if self.active.contains(&entry) {
                    return Err(TransformError::RecursionLoop {
                        schema_path: rule.schema_path.clone(),
                        source_path: at,
                    });
                }
                self.active.push(entry);
                let result = self.apply(def_rule, &value, &at);
                self.active.pop();
                result
            }
        }
    }

    fn apply_array(
        &mut self,
        rule: &MappingRule,
        value: &Value,
        pointer: &str,
        item: Option<&MappingRule>,
        conditions: Option<&Conditions>,
        get_one: bool,
    ) -> Result<Option<Value>, TransformError> {
        let elements: Vec<(String, &Value)> = match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("{}/{}", pointer, i), v))
                .collect(),
            other => {
                // An unmapped array wraps its subject even in strict mode
                if self.options.is_strict() && !matches!(rule.source, Source::Inherit) {
                    return self.mismatch(rule, other, pointer);
                }
                // A lone value stands in for a one-element array
                vec![(pointer.to_string(), other)]
            }
        };

        let mut results = Vec::new();
        for (at, element) in elements {
            if conditions.is_some_and(|c| !c.matches(element)) {
                continue;
            }
            let result = match item {
                Some(item) => match self.apply(item, element, &at) {
                    Ok(result) => result,
                    Err(err) => {
                        self.report(err)?;
                        None
                    }
                },
                None => non_empty(element.clone()),
            };
            if let Some(result) = result {
                if get_one {
                    return Ok(Some(result));
                }
                results.push(result);
            }
        }

        if get_one {
            return Ok(None);
        }
        Ok(non_empty(Value::Array(results)))
    }

    fn apply_keyed(
        &mut self,
        rule: &MappingRule,
        value: &Value,
        pointer: &str,
        key_field: &str,
        value_rule: &MappingRule,
    ) -> Result<Option<Value>, TransformError> {
        let Value::Object(entries) = value else {
            return self.mismatch(rule, value, pointer);
        };

        let mut elements = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            let at = format!("{}/{}", pointer, escape_pointer(key));

            let mut element = Map::new();
            element.insert(key_field.to_string(), Value::String(key.clone()));

            let fields = match self.apply(value_rule, entry, &at) {
                Ok(fields) => fields,
                Err(err) => {
                    self.report(err)?;
                    None
                }
            };
            if let Some(Value::Object(fields)) = fields {
                for (name, field) in fields {
                    // The originating key always wins
                    if name != key_field {
                        element.insert(name, field);
                    }
                }
            }
            elements.push((key.clone(), Value::Object(element)));
        }

        let out = match self.options.key_map_output {
            KeyMapOutput::Elements => {
                Value::Array(elements.into_iter().map(|(_, element)| element).collect())
            }
            KeyMapOutput::Keyed => Value::Object(elements.into_iter().collect()),
        };
        Ok(non_empty(out))
    }

    /// Read the rule's source. Returns the value (if present) and the input
    /// pointer it was read from.
    fn read<'v>(
        &mut self,
        rule: &'v MappingRule,
        subject: &'v Value,
        pointer: &str,
    ) -> Result<(Option<Cow<'v, Value>>, String), TransformError>
    where
        'a: 'v,
    {
        match &rule.source {
            Source::Constant(value) => Ok((Some(Cow::Borrowed(value)), pointer.to_string())),
            Source::Inherit => Ok((Some(Cow::Borrowed(subject)), pointer.to_string())),
            Source::Path(path) => Ok(path.lookup(subject, self.root, pointer)),
            Source::Composite {
                parts,
                whole,
                priority,
            } => {
                let (value, at) =
                    self.compose(rule, parts, whole.as_deref(), priority, subject, pointer)?;
                Ok((value.map(Cow::Owned), at))
            }
        }
    }

    /// Gather composite parts, or decompose the undivided `whole` field.
    fn compose(
        &mut self,
        rule: &MappingRule,
        parts: &[SourcePath],
        whole: Option<&str>,
        priority: &[String],
        subject: &Value,
        pointer: &str,
    ) -> Result<(Option<Value>, String), TransformError> {
        let coerce_parts =
            matches!(rule.kind, RuleKind::Scalar) && matches!(rule.value_type, ValueType::Scalar(_));

        let mut found = Vec::new();
        for part in parts {
            let (value, at) = part.lookup(subject, self.root, pointer);
            let Some(value) = value else {
                continue;
            };
            let value = if coerce_parts {
                match self.coerce(rule, value.into_owned(), &at)? {
                    Some(v) => v,
                    None => continue,
                }
            } else {
                value.into_owned()
            };
            let preferred = priority.iter().any(|p| p == part.as_str());
            found.push((part_name(part), value, preferred));
        }

        if found.iter().any(|(_, _, preferred)| *preferred) {
            found.retain(|(_, _, preferred)| *preferred);
        }
        let found: Vec<(String, Value)> = found
            .into_iter()
            .map(|(name, value, _)| (name, value))
            .collect();

        if !found.is_empty() {
            return Ok((Some(assemble(rule, found)), pointer.to_string()));
        }

        let Some(whole) = whole else {
            return Ok((None, first_part_pointer(parts, pointer)));
        };
        let at = format!("{}/{}", pointer, escape_pointer(whole));
        let undivided = match subject.get(whole) {
            Some(v) if !v.is_null() && !v.is_object() && !v.is_array() => v,
            _ => return Ok((None, first_part_pointer(parts, pointer))),
        };

        let decompose = self
            .options
            .decomposers
            .get(&rule.semantic_type)
            .ok_or_else(|| TransformError::NoDecomposer {
                schema_path: rule.schema_path.clone(),
                source_path: at.clone(),
                semantic_type: rule.semantic_type.clone(),
            })?;

        let pieces = match decompose(undivided, parts.len()) {
            Some(pieces) if pieces.len() == parts.len() => pieces,
            _ => {
                return Err(TransformError::DecompositionFailed {
                    schema_path: rule.schema_path.clone(),
                    source_path: at,
                    semantic_type: rule.semantic_type.clone(),
                    expected: parts.len(),
                })
            }
        };

        let found = parts.iter().map(part_name).zip(pieces).collect();
        Ok((Some(assemble(rule, found)), at))
    }

    fn missing(
        &mut self,
        rule: &MappingRule,
        source_path: String,
    ) -> Result<Option<Value>, TransformError> {
        if rule.required && self.options.is_strict() {
            return Err(TransformError::MissingRequiredField {
                schema_path: rule.schema_path.clone(),
                source_path,
            });
        }
        tracing::debug!(schema_path = %rule.schema_path, %source_path, "source field absent");
        Ok(None)
    }

    fn coerce(
        &mut self,
        rule: &MappingRule,
        value: Value,
        pointer: &str,
    ) -> Result<Option<Value>, TransformError> {
        let coerced = match rule.value_type {
            ValueType::Object if value.is_object() => Some(value.clone()),
            ValueType::Array if value.is_array() => Some(value.clone()),
            ValueType::Object | ValueType::Array => None,
            ValueType::Scalar(scalar) => {
                let reduced = if self.options.is_strict() {
                    Some(&value)
                } else {
                    first_leaf(&value)
                };
                reduced.and_then(|v| coerce_scalar(scalar, v))
            }
        };

        match coerced {
            Some(v) => Ok(non_empty(v)),
            None => self.mismatch(rule, &value, pointer),
        }
    }

    /// Strict mode fails; lenient mode keeps the value as it was.
    fn mismatch(
        &mut self,
        rule: &MappingRule,
        value: &Value,
        pointer: &str,
    ) -> Result<Option<Value>, TransformError> {
        if self.options.is_strict() {
            return Err(TransformError::TypeMismatch {
                schema_path: rule.schema_path.clone(),
                source_path: pointer.to_string(),
                expected: rule.value_type.name().to_string(),
                actual: json_type_name(value).to_string(),
            });
        }
        tracing::debug!(
            schema_path = %rule.schema_path,
            pointer,
            expected = rule.value_type.name(),
            actual = json_type_name(value),
            "type mismatch, keeping value"
        );
        match rule.kind {
            RuleKind::Scalar => Ok(non_empty(value.clone())),
            _ => Ok(None),
        }
    }
}

fn part_name(part: &SourcePath) -> String {
    part.last_field().unwrap_or(part.as_str()).to_string()
}

fn first_part_pointer(parts: &[SourcePath], pointer: &str) -> String {
    match parts.first() {
        Some(part) => {
            let mut at = pointer.to_string();
            for segment in part.segments() {
                match segment {
                    Segment::Root => at.clear(),
                    Segment::Field(name) => {
                        at.push('/');
                        at.push_str(&escape_pointer(name));
                    }
                }
            }
            at
        }
        None => pointer.to_string(),
    }
}

/// Combine composite parts: an array for array rules, a joined string when
/// `JOIN` is set, otherwise an object keyed by part name.
fn assemble(rule: &MappingRule, found: Vec<(String, Value)>) -> Value {
    if matches!(rule.kind, RuleKind::Array { .. }) {
        return Value::Array(found.into_iter().map(|(_, v)| v).collect());
    }
    if let Some(separator) = &rule.join {
        let joined: Vec<String> = found
            .into_iter()
            .map(|(_, v)| match v {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
        return Value::String(joined.join(separator));
    }
    Value::Object(found.into_iter().collect())
}

/// Drill into containers until a scalar is found (first value of objects,
/// first element of arrays).
fn first_leaf(value: &Value) -> Option<&Value> {
    match value {
        Value::Object(map) => map.values().next().and_then(first_leaf),
        Value::Array(items) => items.first().and_then(first_leaf),
        other => Some(other),
    }
}

fn coerce_scalar(target: ScalarType, value: &Value) -> Option<Value> {
    match target {
        ScalarType::String => match value {
            Value::String(_) => Some(value.clone()),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        ScalarType::Int => match value {
            Value::Number(n) if n.is_i64() || n.is_u64() => Some(value.clone()),
            Value::Number(n) => n.as_f64().and_then(integral),
            Value::String(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(i) => Some(Value::from(i)),
                    Err(_) => s.parse::<f64>().ok().and_then(integral),
                }
            }
            _ => None,
        },
        ScalarType::Float => match value {
            Value::Number(n) => n.as_f64().and_then(float),
            Value::String(s) => s.trim().parse::<f64>().ok().and_then(float),
            _ => None,
        },
        ScalarType::Number => match value {
            Value::Number(_) => Some(value.clone()),
            Value::String(s) => {
                let s = s.trim();
                match s.parse::<i64>() {
                    Ok(i) => Some(Value::from(i)),
                    Err(_) => s.parse::<f64>().ok().and_then(float),
                }
            }
            _ => None,
        },
        ScalarType::Boolean => match value {
            Value::Bool(_) => Some(value.clone()),
            Value::String(s) if s.eq_ignore_ascii_case("true") => Some(Value::Bool(true)),
            Value::String(s) if s.eq_ignore_ascii_case("false") => Some(Value::Bool(false)),
            _ => None,
        },
        ScalarType::Date => match value {
            Value::String(_) => Some(value.clone()),
            _ => None,
        },
    }
}

fn integral(f: f64) -> Option<Value> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}

fn float(f: f64) -> Option<Value> {
    Number::from_f64(f).map(Value::Number)
}

fn non_empty(value: Value) -> Option<Value> {
    let empty = match &value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    };
    (!empty).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn coerce_int() {
        assert_eq!(coerce_scalar(ScalarType::Int, &json!(40)), Some(json!(40)));
        assert_eq!(coerce_scalar(ScalarType::Int, &json!("40")), Some(json!(40)));
        assert_eq!(coerce_scalar(ScalarType::Int, &json!(" 7.0 ")), Some(json!(7)));
        assert_eq!(coerce_scalar(ScalarType::Int, &json!(2.5)), None);
        assert_eq!(coerce_scalar(ScalarType::Int, &json!("forty")), None);
    }

    #[test]
    fn coerce_int_rejects_out_of_range_floats() {
        // 2^63 is one past i64::MAX and must not saturate
        assert_eq!(coerce_scalar(ScalarType::Int, &json!(9.223372036854775808e18)), None);
        assert_eq!(coerce_scalar(ScalarType::Int, &json!("9223372036854775808.0")), None);
        assert_eq!(
            coerce_scalar(ScalarType::Int, &json!(-9.223372036854775808e18)),
            Some(json!(i64::MIN))
        );
    }

    #[test]
    fn coerce_string_and_bool() {
        assert_eq!(coerce_scalar(ScalarType::String, &json!(12)), Some(json!("12")));
        assert_eq!(coerce_scalar(ScalarType::String, &json!(true)), Some(json!("true")));
        assert_eq!(coerce_scalar(ScalarType::String, &json!({})), None);
        assert_eq!(coerce_scalar(ScalarType::Boolean, &json!("TRUE")), Some(json!(true)));
        assert_eq!(coerce_scalar(ScalarType::Boolean, &json!(1)), None);
    }

    #[test]
    fn coerce_float() {
        assert_eq!(coerce_scalar(ScalarType::Float, &json!(2)), Some(json!(2.0)));
        assert_eq!(coerce_scalar(ScalarType::Float, &json!("1.5")), Some(json!(1.5)));
        assert_eq!(coerce_scalar(ScalarType::Number, &json!("3")), Some(json!(3)));
    }

    #[test]
    fn first_leaf_reduces_containers() {
        assert_eq!(first_leaf(&json!({ "a": [1, 2] })), Some(&json!(1)));
        assert_eq!(first_leaf(&json!([])), None);
        assert_eq!(first_leaf(&json!("x")), Some(&json!("x")));
    }

    #[test]
    fn empty_values() {
        assert_eq!(non_empty(json!(null)), None);
        assert_eq!(non_empty(json!(" ")), None);
        assert_eq!(non_empty(json!({})), None);
        assert_eq!(non_empty(json!([])), None);
        assert_eq!(non_empty(json!(0)), Some(json!(0)));
        assert_eq!(non_empty(json!(false)), Some(json!(false)));
    }

    #[test]
    fn missing_part_pointer() {
        let parts = vec![SourcePath::parse("person.first"), SourcePath::parse("last")];
        assert_eq!(first_part_pointer(&parts, "/rows/0"), "/rows/0/person/first");
    }
}
