pub const DEFAULT_BENCHMARKS_YAML: &str = include_str!("../templates/benchmarks.yaml");
pub const CONFIG_YAML: &str = include_str!("../templates/config.yaml");
