//! Command-line argument formatting for each Terraform verb.

use serde_json::Value;

use crate::options::TerraformOptions;

/// Arguments for `terraform init`.
pub fn init_args(options: &TerraformOptions) -> Vec<String> {
    let mut args = vec!["init".to_string(), format!("-upgrade={}", options.upgrade)];
    if options.reconfigure {
        args.push("-reconfigure".to_string());
    }
    for (key, value) in &options.backend_config {
        args.push(format!("-backend-config={}={}", key, value));
    }
    push_no_color(&mut args, options);
    args
}

/// Arguments for `terraform apply`.
pub fn apply_args(options: &TerraformOptions) -> Vec<String> {
    let mut args = vec![
        "apply".to_string(),
        "-input=false".to_string(),
        "-auto-approve".to_string(),
    ];
    push_lock(&mut args, options);
    push_parallelism(&mut args, options);
    push_vars(&mut args, options);
    push_no_color(&mut args, options);
    args
}

/// Arguments for `terraform destroy`.
pub fn destroy_args(options: &TerraformOptions) -> Vec<String> {
    let mut args = vec![
        "destroy".to_string(),
        "-auto-approve".to_string(),
        "-input=false".to_string(),
    ];
    push_lock(&mut args, options);
    push_parallelism(&mut args, options);
    push_vars(&mut args, options);
    push_no_color(&mut args, options);
    args
}

/// Arguments for `terraform plan`. With `detailed_exitcode`, terraform exits
/// 0 for no changes, 1 for errors and 2 for pending changes.
pub fn plan_args(options: &TerraformOptions, detailed_exitcode: bool) -> Vec<String> {
    let mut args = vec!["plan".to_string(), "-input=false".to_string()];
    if detailed_exitcode {
        args.push("-detailed-exitcode".to_string());
    }
    push_lock(&mut args, options);
    push_parallelism(&mut args, options);
    push_vars(&mut args, options);
    push_no_color(&mut args, options);
    args
}

/// Arguments for `terraform validate`.
pub fn validate_args(options: &TerraformOptions) -> Vec<String> {
    let mut args = vec!["validate".to_string()];
    push_no_color(&mut args, options);
    args
}

/// Arguments for `terraform output -json [name]`.
pub fn output_args(name: Option<&str>) -> Vec<String> {
    let mut args = vec![
        "output".to_string(),
        "-no-color".to_string(),
        "-json".to_string(),
    ];
    if let Some(name) = name {
        args.push(name.to_string());
    }
    args
}

/// Arguments for `terraform state list`.
pub fn state_list_args() -> Vec<String> {
    vec!["state".to_string(), "list".to_string()]
}

fn push_no_color(args: &mut Vec<String>, options: &TerraformOptions) {
    if options.no_color {
        args.push("-no-color".to_string());
    }
}

fn push_lock(args: &mut Vec<String>, options: &TerraformOptions) {
    if let Some(lock) = options.lock {
        args.push(format!("-lock={}", lock));
    }
    if let Some(timeout) = &options.lock_timeout {
        args.push(format!("-lock-timeout={}", timeout));
    }
}

fn push_parallelism(args: &mut Vec<String>, options: &TerraformOptions) {
    if let Some(n) = options.parallelism {
        args.push(format!("-parallelism={}", n));
    }
}

fn push_vars(args: &mut Vec<String>, options: &TerraformOptions) {
    for (key, value) in &options.vars {
        args.push("-var".to_string());
        args.push(format!("{}={}", key, var_value(value)));
    }
    for file in &options.var_files {
        args.push(format!("-var-file={}", file.display()));
    }
}

/// Top-level strings are passed raw; everything else uses HCL syntax.
fn var_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => to_hcl(other),
    }
}

/// Render a JSON value as an HCL expression.
pub fn to_hcl(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        Value::Array(items) => {
            let items: Vec<String> = items.iter().map(to_hcl).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(map) => {
            let entries: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{} = {}", hcl_key(k), to_hcl(v)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
    }
}

fn hcl_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        && !key.starts_with(|c: char| c.is_ascii_digit());
    if bare {
        key.to_string()
    } else {
        format!("\"{}\"", key)
    }
}
