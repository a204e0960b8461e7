//! Demo part catalog served by the in-process inventory.

use common::PartId;
use domain::Money;
use saga::{InMemoryPartLookup, Part, PartCategory};
use uuid::Uuid;

/// Parts with fixed ids, so orders can be placed against a fresh process.
pub fn demo_parts() -> Vec<Part> {
    let part = |id: u128, name: &str, cents: i64, category: PartCategory, country: &str| {
        Part::new(PartId::from_uuid(Uuid::from_u128(id)), name, Money::from_cents(cents))
            .with_category(category)
            .with_manufacturer_country(country)
    };

    vec![
        part(0x1, "Ion thruster", 1_250_000, PartCategory::Engine, "Japan").with_tag("propulsion"),
        part(0x2, "Plasma drive", 2_990_000, PartCategory::Engine, "USA").with_tag("propulsion"),
        part(0x3, "Hydrazine tank", 180_000, PartCategory::Fuel, "Germany"),
        part(0x4, "Cryo fuel cell", 420_000, PartCategory::Fuel, "France").with_tag("cryogenic"),
        part(0x5, "Quartz porthole", 95_000, PartCategory::Porthole, "Italy"),
        part(0x6, "Delta wing", 760_000, PartCategory::Wing, "UK").with_tag("aero"),
    ]
}

/// An inventory holding [`demo_parts`].
pub fn demo_catalog() -> InMemoryPartLookup {
    InMemoryPartLookup::with_parts(demo_parts())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_demo_ids_are_stable_and_unique() {
        let parts = demo_parts();
        let ids: HashSet<PartId> = parts.iter().map(|p| p.id).collect();
        assert_eq!(ids.len(), parts.len());
        assert_eq!(
            parts[0].id.to_string(),
            "00000000-0000-0000-0000-000000000001"
        );
    }
}
