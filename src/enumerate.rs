//! Workload enumeration per namespace.
use crate::cluster::Cluster;
use crate::error::PipelineError;
use crate::model::WorkloadRef;

/// List the workloads of `namespace`, sorted lexicographically by name.
///
/// An empty listing is an error: it usually means the namespace argument is
/// wrong rather than that the namespace is genuinely idle.
pub fn list(cluster: &dyn Cluster, namespace: &str) -> Result<Vec<WorkloadRef>, PipelineError> {
    let mut names = cluster
        .list_workloads(namespace)
        .map_err(|err| PipelineError::Enumeration {
            namespace: namespace.to_string(),
            reason: format!("{err:#}"),
        })?;
    if names.is_empty() {
        return Err(PipelineError::EmptyNamespace {
            namespace: namespace.to_string(),
        });
    }
    names.sort();
    names.dedup();
    Ok(names
        .into_iter()
        .map(|name| WorkloadRef::new(namespace, name))
        .collect())
}
