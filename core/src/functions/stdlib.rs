//! Built-in functions
//!
//! `forEach(list, template, delimiter = "%")` renders `template` once per
//! element of `list` and concatenates the results. Inside the template:
//!
//! - `%index%` - zero-based position
//! - `%humanIndex%` - one-based position
//! - `%value%` - the element as text
//! - `%value.path%` - a path inside the element (`%value.name%`, `%value.tags[0]%`)
//!
//! Unknown or undefined references are left as written.

use anyhow::{anyhow, bail, Result};
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;

use super::FunctionDictionary;
use crate::storage::{to_text, Storage};

pub fn register(functions: &mut FunctionDictionary) {
    functions.register_fn("forEach", for_each);
}

/// Execute forEach()
///
/// Arguments: (list: array, template: string, delimiter?: string)
pub fn for_each(args: Vec<JsonValue>) -> Result<Option<JsonValue>> {
    let mut args = args.into_iter();

    let list = match args.next() {
        Some(JsonValue::Array(items)) => items,
        Some(other) => bail!("forEach() first argument must be an array, got {}", other),
        None => bail!("forEach() requires a list and a template"),
    };

    let template = match args.next() {
        Some(JsonValue::String(template)) => template,
        _ => bail!("forEach() second argument must be a string (template)"),
    };

    let delimiter = match args.next() {
        Some(JsonValue::String(delimiter)) if !delimiter.is_empty() => delimiter,
        None | Some(JsonValue::Null) => "%".to_string(),
        Some(other) => bail!("forEach() delimiter must be a non-empty string, got {}", other),
    };

    let d = regex::escape(&delimiter);
    let pattern = Regex::new(&format!(r"{d}(index|humanIndex|value(?:\.[\w\[\].]+)?){d}"))
        .map_err(|e| anyhow!("forEach() cannot use delimiter '{}': {}", delimiter, e))?;

    let rendered: String = list
        .into_iter()
        .enumerate()
        .map(|(index, item)| render(&pattern, &template, index, item))
        .collect();

    Ok(Some(JsonValue::String(rendered)))
}

fn render(pattern: &Regex, template: &str, index: usize, item: JsonValue) -> String {
    let item = Storage::from_value(item);

    pattern
        .replace_all(template, |caps: &Captures<'_>| match &caps[1] {
            "index" => index.to_string(),
            "humanIndex" => (index + 1).to_string(),
            "value" => to_text(item.local()),
            reference => {
                let path = reference.trim_start_matches("value.");
                item.get_value(path)
                    .map(to_text)
                    .unwrap_or_else(|| caps[0].to_string())
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn employees() -> JsonValue {
        json!([
            { "name": "Lutfi", "age": 17 },
            { "name": "Joey", "age": 21 },
            { "name": "John", "age": 44 }
        ])
    }

    #[test]
    fn test_for_each_renders_every_element() {
        let result = for_each(vec![
            employees(),
            json!("\n%humanIndex%. %value.name% age %value.age% [%index%]"),
        ])
        .unwrap();

        assert_eq!(
            result,
            Some(json!("\n1. Lutfi age 17 [0]\n2. Joey age 21 [1]\n3. John age 44 [2]"))
        );
    }

    #[test]
    fn test_for_each_custom_delimiter() {
        let result = for_each(vec![
            json!(["a", "b"]),
            json!("$index$=$value$;"),
            json!("$"),
        ])
        .unwrap();
        assert_eq!(result, Some(json!("0=a;1=b;")));
    }

    #[test]
    fn test_for_each_leaves_unknown_paths() {
        let result = for_each(vec![employees(), json!("%value.salary%|")]).unwrap();
        assert_eq!(result, Some(json!("%value.salary%|%value.salary%|%value.salary%|")));
    }

    #[test]
    fn test_for_each_argument_errors() {
        assert!(for_each(vec![]).is_err());
        assert!(for_each(vec![json!("not a list"), json!("t")]).is_err());
        assert!(for_each(vec![json!([]), json!(1)]).is_err());
        assert_eq!(for_each(vec![json!([]), json!("x")]).unwrap(), Some(json!("")));
    }
}
