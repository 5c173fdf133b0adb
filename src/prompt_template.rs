use std::collections::HashMap;

use serde_json::Value;
use tera::{Context, Error as TeraError, Tera};

/// Render an inline template against a parameter map.
///
/// Rendering is a pure function of its inputs: the same template and
/// parameters always produce the same text. Missing variables are an error.
pub fn render_template(template: &str, params: &HashMap<String, Value>) -> Result<String, TeraError> {
    let mut tera = Tera::default();
    tera.add_raw_template("inline_template", template)?;
    let mut context = Context::new();
    for (key, value) in params {
        context.insert(key, value);
    }
    tera.render("inline_template", &context)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_render_template() {
        let template = "Hello, {{ name }}! You are {{ age }} years old.";
        let mut params = HashMap::new();
        params.insert("name".to_string(), json!("Alice"));
        params.insert("age".to_string(), json!(30));

        let result = render_template(template, &params).unwrap();
        assert_eq!(result, "Hello, Alice! You are 30 years old.");
    }

    #[test]
    fn test_render_template_missing_variable() {
        let template = "Hello, {{ name }}!";
        let params = HashMap::new();
        let result = render_template(template, &params);
        assert!(result.is_err());
    }

    #[test]
    fn test_render_template_is_repeatable() {
        let template = "memory: {{ long_term_memory }}";
        let mut params = HashMap::new();
        params.insert("long_term_memory".to_string(), json!("it was sunny"));

        let first = render_template(template, &params).unwrap();
        let second = render_template(template, &params).unwrap();
        assert_eq!(first, second);
    }
}
