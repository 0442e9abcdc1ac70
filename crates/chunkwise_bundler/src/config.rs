use chunkwise_core::config_loader::ConfigLoader;
use chunkwise_core::diagnostic_error;
use chunkwise_core::types::CodeFrame;
use chunkwise_core::types::DiagnosticBuilder;
use chunkwise_core::types::ErrorKind;
use serde::Deserialize;
use serde_repr::Deserialize_repr;
use serde_repr::Serialize_repr;
use tracing::debug;

/// The package.json key bundler options are read from
pub const BUNDLER_CONFIG_KEY: &str = "@chunkwise/bundler-default";

/// The HTTP version bundles are served over, which decides the default limits
#[derive(Clone, Copy, Debug, Default, Deserialize_repr, Eq, PartialEq, Serialize_repr)]
#[repr(u8)]
pub enum HttpVersion {
  Http1 = 1,
  #[default]
  Http2 = 2,
}

/// Resolved bundler options
#[derive(Clone, Debug, PartialEq)]
pub struct BundlerConfig {
  pub http: HttpVersion,

  /// Shared bundles are only created for assets needed by more than this many bundles
  pub min_bundles: usize,

  /// Shared bundles smaller than this many bytes are merged back into their source bundles
  pub min_bundle_size: u64,

  /// Upper bound on the number of bundles loaded in parallel for one bundle group
  pub max_parallel_requests: usize,
}

impl BundlerConfig {
  pub fn for_http_version(http: HttpVersion) -> Self {
    match http {
      HttpVersion::Http1 => BundlerConfig {
        http,
        min_bundles: 1,
        min_bundle_size: 30000,
        max_parallel_requests: 6,
      },
      HttpVersion::Http2 => BundlerConfig {
        http,
        min_bundles: 1,
        min_bundle_size: 20000,
        max_parallel_requests: 25,
      },
    }
  }
}

impl Default for BundlerConfig {
  fn default() -> Self {
    BundlerConfig::for_http_version(HttpVersion::default())
  }
}

/// Bundler options as written by the user. Unset fields fall back to the HTTP version defaults.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BundlerConfigFile {
  pub http: Option<HttpVersion>,
  pub min_bundles: Option<usize>,
  pub min_bundle_size: Option<u64>,
  pub max_parallel_requests: Option<usize>,
}

impl From<BundlerConfigFile> for BundlerConfig {
  fn from(file: BundlerConfigFile) -> Self {
    let defaults = BundlerConfig::for_http_version(file.http.unwrap_or_default());

    BundlerConfig {
      http: defaults.http,
      min_bundles: file.min_bundles.unwrap_or(defaults.min_bundles),
      min_bundle_size: file.min_bundle_size.unwrap_or(defaults.min_bundle_size),
      max_parallel_requests: file
        .max_parallel_requests
        .unwrap_or(defaults.max_parallel_requests),
    }
  }
}

/// Reads bundler options from the closest package.json.
///
/// A missing package.json or a package.json without the bundler key yields the defaults. Invalid
/// options are reported as a `Diagnostic` pointing at the key.
pub fn load_bundler_config(config_loader: &ConfigLoader) -> anyhow::Result<BundlerConfig> {
  let Some(package_json) =
    config_loader.load_package_json_key::<BundlerConfigFile>(BUNDLER_CONFIG_KEY)?
  else {
    debug!("No bundler options found, using default bundler config");
    return Ok(BundlerConfig::default());
  };

  let config = BundlerConfig::from(package_json.contents.clone());
  if config.max_parallel_requests == 0 {
    return Err(diagnostic_error!(DiagnosticBuilder::default()
      .kind(ErrorKind::InvalidConfig)
      .code_frames(vec![CodeFrame::from(&package_json)])
      .hints(vec![String::from(
        "maxParallelRequests must allow at least one request"
      )])
      .message(format!(
        "Invalid {BUNDLER_CONFIG_KEY} config in {}",
        package_json.path.display()
      ))));
  }

  debug!(
    min_bundles = config.min_bundles,
    min_bundle_size = config.min_bundle_size,
    max_parallel_requests = config.max_parallel_requests,
    path = %package_json.path.display(),
    "Loaded bundler config"
  );

  Ok(config)
}
