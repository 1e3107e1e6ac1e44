use serde_json::{Map, Value};
use crate::core::errors::ApiError;

const RETRIEVER_BACKENDS: [&str; 2] = ["sqlite", "qdrant"];

pub fn validate_config(config: &Value) -> Result<(), ApiError> {
    let root = config
        .as_object()
        .ok_or_else(|| config_type_error("root", "object"))?;

    if let Some(server) = expect_optional_object(root, "server")? {
        validate_optional_string_field(server, "server.host", "host")?;
        validate_u64_field(server, "server.port", "port", 1, 65_535)?;
        validate_string_array_field(
            server,
            "server.cors_allowed_origins",
            "cors_allowed_origins",
        )?;
    }

    if let Some(recommender) = expect_optional_object(root, "recommender")? {
        validate_model_id_field(recommender, "recommender.embedding_model", "embedding_model")?;
        validate_model_id_field(
            recommender,
            "recommender.generation_model",
            "generation_model",
        )?;
        if recommender.get("planner_model").is_some_and(|v| !v.is_null()) {
            validate_model_id_field(recommender, "recommender.planner_model", "planner_model")?;
        }
        validate_choice_field(
            recommender,
            "recommender.retriever_backend",
            "retriever_backend",
            &RETRIEVER_BACKENDS,
        )?;
        validate_u64_field(recommender, "recommender.k", "k", 1, 100)?;
        validate_f64_field(
            recommender,
            "recommender.similarity_threshold",
            "similarity_threshold",
            0.0,
            1.0,
        )?;
        validate_u64_field(
            recommender,
            "recommender.max_recommendations",
            "max_recommendations",
            1,
            50,
        )?;
        validate_u64_field(
            recommender,
            "recommender.request_timeout_secs",
            "request_timeout_secs",
            1,
            3_600,
        )?;
    }

    if let Some(rate_limit) = expect_optional_object(root, "rate_limit")? {
        validate_u64_field(
            rate_limit,
            "rate_limit.max_requests",
            "max_requests",
            1,
            10_000,
        )?;
        validate_u64_field(rate_limit, "rate_limit.window_secs", "window_secs", 1, 86_400)?;
    }

    if let Some(providers) = expect_optional_object(root, "providers")? {
        for (name, provider) in providers {
            let path = format!("providers.{}", name);
            let Some(provider) = provider.as_object() else {
                return Err(config_type_error(&path, "object"));
            };
            validate_required_string_field(provider, &format!("{}.base_url", path), "base_url")?;
            validate_optional_string_field(provider, &format!("{}.api_key", path), "api_key")?;
            validate_u64_field(
                provider,
                &format!("{}.timeout_secs", path),
                "timeout_secs",
                1,
                3_600,
            )?;
            validate_u64_field(
                provider,
                &format!("{}.max_retries", path),
                "max_retries",
                0,
                10,
            )?;
        }
    }

    if let Some(qdrant) = expect_optional_object(root, "qdrant")? {
        validate_optional_string_field(qdrant, "qdrant.url", "url")?;
        validate_optional_string_field(qdrant, "qdrant.collection", "collection")?;
        validate_optional_string_field(qdrant, "qdrant.api_key", "api_key")?;
        validate_u64_field(qdrant, "qdrant.timeout_secs", "timeout_secs", 1, 3_600)?;
    }

    Ok(())
}

fn expect_optional_object<'a>(
    root: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a Map<String, Value>>, ApiError> {
    match root.get(key) {
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(config_type_error(key, "object")),
        None => Ok(None),
    }
}

fn validate_u64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: u64,
    max: u64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_u64() else {
        return Err(config_type_error(path, "integer"));
    };
    if number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_f64_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    min: f64,
    max: f64,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(number) = value.as_f64() else {
        return Err(config_type_error(path, "number"));
    };
    if !number.is_finite() || number < min || number > max {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': must be between {} and {}",
            path, min, max
        )));
    }
    Ok(())
}

fn validate_required_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let value = section.get(key).ok_or_else(|| {
        ApiError::BadRequest(format!("Invalid config at '{}': value is required", path))
    })?;
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if text.trim().is_empty() {
        return Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': value cannot be empty",
            path
        )));
    }
    Ok(())
}

fn validate_optional_string_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    if value.is_null() || value.as_str().is_some() {
        return Ok(());
    }
    Err(config_type_error(path, "string"))
}

/// Model ids take the form `provider/model`.
fn validate_model_id_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    match text.split_once('/') {
        Some((provider, model)) if !provider.trim().is_empty() && !model.trim().is_empty() => {
            Ok(())
        }
        _ => Err(ApiError::BadRequest(format!(
            "Invalid config at '{}': expected 'provider/model', got '{}'",
            path, text
        ))),
    }
}

fn validate_choice_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
    choices: &[&str],
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(text) = value.as_str() else {
        return Err(config_type_error(path, "string"));
    };
    if choices.contains(&text) {
        return Ok(());
    }
    Err(ApiError::BadRequest(format!(
        "Invalid config at '{}': expected one of {}",
        path,
        choices.join(", ")
    )))
}

fn validate_string_array_field(
    section: &Map<String, Value>,
    path: &str,
    key: &str,
) -> Result<(), ApiError> {
    let Some(value) = section.get(key) else {
        return Ok(());
    };
    let Some(items) = value.as_array() else {
        return Err(config_type_error(path, "array of strings"));
    };
    for (index, item) in items.iter().enumerate() {
        let Some(text) = item.as_str() else {
            return Err(config_type_error(&format!("{}[{}]", path, index), "string"));
        };
        if text.trim().is_empty() {
            return Err(ApiError::BadRequest(format!(
                "Invalid config at '{}[{}]': value cannot be empty",
                path, index
            )));
        }
    }
    Ok(())
}

fn config_type_error(path: &str, expected: &str) -> ApiError {
    ApiError::BadRequest(format!(
        "Invalid config at '{}': expected {}",
        path, expected
    ))
}
