//! Kubeconfig rendering for a stack, and merging the rendered config into
//! the user's kubeconfig.

use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use minijinja::Environment;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::error::AppError;
use crate::executor::Executor;
use crate::model::{normalize_exec_args, Kubeconfig, Stacks};
use crate::template::Templater;

const DEFAULT_EXEC_API_VERSION: &str = "client.authentication.k8s.io/v1beta1";

const KUBECONFIG_TEMPLATE: &str = r#"apiVersion: v1
kind: Config
current-context: {{ clusters[current].context }}
contexts:
{%- for c in clusters %}
  - name: {{ c.context }}
    context:
      cluster: {{ c.context }}
      user: {{ c.context }}
{%- endfor %}
clusters:
{%- for c in clusters %}
  - name: {{ c.context }}
    cluster:
      server: {{ c.host }}
      certificate-authority-data: {{ c.cert }}
{%- endfor %}
users:
{%- for c in clusters %}
  - name: {{ c.context }}
    user:
{%- if c.exec_command %}
      exec:
        apiVersion: {{ c.exec_apiversion }}
        command: {{ c.exec_command }}
{%- if c.exec_args %}
        args:
{%- for arg in c.exec_args %}
          - {{ arg }}
{%- endfor %}
{%- endif %}
{%- elif c.token %}
      token: {{ c.token }}
{%- endif %}
{%- endfor %}
"#;

/// Render the stack's kubeconfig: clamp the current index, default the exec
/// API version, resolve every field through the templater and normalize
/// exec args to a string list.
pub fn render(
    kubeconfig: &Kubeconfig,
    config: &Config,
    stacks: &Stacks,
    executor: &dyn Executor,
    stack_name: &str,
) -> Result<String, AppError> {
    if kubeconfig.clusters.is_empty() {
        return Ok(String::new());
    }

    let mut kc = kubeconfig.clone();
    if kc.current < 0 || kc.current >= kc.clusters.len() as i64 {
        kc.current = 0;
    }
    for cluster in &mut kc.clusters {
        if cluster.exec_apiversion.is_empty() {
            cluster.exec_apiversion = DEFAULT_EXEC_API_VERSION.to_string();
        }
    }

    let templater = Templater::new(config, stacks, executor, stack_name)?;
    let resolved = templater.resolve_value(&serde_json::to_value(&kc)?, None)?;
    let mut kc: Kubeconfig = serde_json::from_value(resolved)?;

    for cluster in &mut kc.clusters {
        cluster.exec_args = match normalize_exec_args(&cluster.exec_args) {
            Some(args) => serde_json::to_value(args)?,
            None => Value::Null,
        };
    }

    let mut env = Environment::new();
    env.set_keep_trailing_newline(true);
    env.render_str(KUBECONFIG_TEMPLATE, &kc)
        .map_err(|e| AppError::Kubeconfig(format!("render failed: {e}")))
}

/// Render and merge the stack's current context, cluster and user into the
/// user's kubeconfig, making the merged context current.
pub fn save(
    kubeconfig: &Kubeconfig,
    config: &Config,
    stacks: &Stacks,
    executor: &dyn Executor,
    stack_name: &str,
) -> Result<(), AppError> {
    let rendered = render(kubeconfig, config, stacks, executor, stack_name)?;
    if rendered.is_empty() {
        return Err(AppError::Kubeconfig("no clusters defined".to_string()));
    }

    let remote: KubeYaml = serde_yaml::from_str(&rendered)?;
    let path = user_kubeconfig_path()?;

    let mut local: KubeYaml = if path.exists() {
        serde_yaml::from_str(&fs::read_to_string(&path)?)?
    } else {
        KubeYaml {
            api_version: "v1".to_string(),
            kind: "Config".to_string(),
            ..Default::default()
        }
    };

    merge_kubeconfig(&remote, &mut local, true)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    debug!(path = %path.display(), "writing merged kubeconfig");
    fs::write(&path, serde_yaml::to_string(&local)?)?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o600))?;
    Ok(())
}

/// First entry of `KUBECONFIG`, else `~/.kube/config`.
fn user_kubeconfig_path() -> Result<PathBuf, AppError> {
    if let Ok(kubeconfig) = std::env::var("KUBECONFIG") {
        if let Some(first) = kubeconfig.split(':').find(|p| !p.is_empty()) {
            return Ok(PathBuf::from(first));
        }
    }

    let home = std::env::var_os("HOME")
        .ok_or_else(|| AppError::config("HOME environment variable not set"))?;
    Ok(PathBuf::from(home).join(".kube").join("config"))
}

/// Copy the remote config's current context plus its cluster and user into
/// the local config, replacing same-named entries.
fn merge_kubeconfig(
    remote: &KubeYaml,
    local: &mut KubeYaml,
    set_current_context: bool,
) -> Result<(), AppError> {
    let context_name = &remote.current_context;
    let context = remote
        .contexts
        .iter()
        .find(|c| &c.name == context_name)
        .ok_or_else(|| {
            AppError::Kubeconfig(format!("config has no context entry named \"{context_name}\""))
        })?;

    let cluster_name = referenced_name(context, "cluster").unwrap_or_else(|| context_name.clone());
    let user_name = referenced_name(context, "user").unwrap_or_else(|| context_name.clone());

    let cluster = remote.clusters.iter().find(|c| c.name == cluster_name).ok_or_else(|| {
        AppError::Kubeconfig(format!("config has no cluster entry named \"{cluster_name}\""))
    })?;
    let user = remote.users.iter().find(|u| u.name == user_name).ok_or_else(|| {
        AppError::Kubeconfig(format!("config has no auth entry named \"{user_name}\""))
    })?;

    upsert(&mut local.contexts, context.clone());
    upsert(&mut local.clusters, cluster.clone());
    upsert(&mut local.users, user.clone());

    if set_current_context {
        debug!(context = %context_name, "setting current kube context");
        local.current_context = context_name.clone();
    }
    Ok(())
}

fn referenced_name(entry: &NamedEntry, key: &str) -> Option<String> {
    entry
        .body
        .get("context")
        .and_then(|context| context.get(key))
        .and_then(|name| name.as_str())
        .map(str::to_string)
}

fn upsert(entries: &mut Vec<NamedEntry>, entry: NamedEntry) {
    match entries.iter_mut().find(|e| e.name == entry.name) {
        Some(existing) => *existing = entry,
        None => entries.push(entry),
    }
}

/// Just enough kubeconfig structure for the three-entry merge; everything
/// else rides along untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KubeYaml {
    #[serde(rename = "apiVersion", default)]
    api_version: String,
    #[serde(default)]
    kind: String,
    #[serde(rename = "current-context", default)]
    current_context: String,
    #[serde(default)]
    contexts: Vec<NamedEntry>,
    #[serde(default)]
    clusters: Vec<NamedEntry>,
    #[serde(default)]
    users: Vec<NamedEntry>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct NamedEntry {
    name: String,
    #[serde(flatten)]
    body: BTreeMap<String, serde_yaml::Value>,
}
