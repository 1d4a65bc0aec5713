//! Format capability check.
//!
//! One service round-trip per call, no caching: the service's format table
//! can change between files and the check is cheap next to the conversion.

use crate::error::RelayError;
use crate::service::ConversionService;
use tracing::{debug, info};

/// True iff `target` is listed (exact, case-sensitive) among the formats
/// reachable from `source`.
pub async fn can_convert(
    service: &dyn ConversionService,
    source: &str,
    target: &str,
) -> Result<bool, RelayError> {
    let targets = service.target_formats(source).await?;
    debug!("'{}' converts to {} formats", source, targets.len());
    Ok(targets.iter().any(|t| t == target))
}

/// Like [`can_convert`], but a negative answer becomes
/// [`RelayError::CapabilityNotFound`].
pub async fn require_capability(
    service: &dyn ConversionService,
    source: &str,
    target: &str,
) -> Result<(), RelayError> {
    if can_convert(service, source, target).await? {
        Ok(())
    } else {
        info!("Cannot convert file: '{}' target format not found", target);
        Err(RelayError::CapabilityNotFound {
            source_ext: source.to_string(),
            target: target.to_string(),
        })
    }
}
