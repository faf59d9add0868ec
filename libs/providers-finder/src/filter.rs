use crate::model::ProviderRecord;

/// Copy of `providers` without records whose package is in `excluded`.
///
/// Records without a package identity are always kept. Relative order is preserved.
pub fn exclude_packages<S: AsRef<str>>(
    providers: &[ProviderRecord],
    excluded: &[S],
) -> Vec<ProviderRecord> {
    if excluded.is_empty() {
        return providers.to_vec();
    }
    providers
        .iter()
        .filter(|p| match &p.package_id {
            Some(pkg) => !excluded.iter().any(|e| e.as_ref() == pkg),
            None => true,
        })
        .cloned()
        .collect()
}
