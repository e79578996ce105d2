//! The admin console's endpoint catalog.

use super::registry::{EndpointDef, EndpointRegistry, TagSpec};
use crate::transport::request::Method;

/// Pointer to the item array inside a list envelope.
pub const LIST_ITEMS: &str = "/data/items";
/// Item identifier field.
pub const ID_FIELD: &str = "id";

/// Standard read/write set for one resource.
fn resource(registry: &mut EndpointRegistry, prefix: &str, kind: &str, path: &str) {
    let item_path = format!("{path}/{{id}}");
    registry.register(
        EndpointDef::query(format!("{prefix}.list"), path)
            .provides(TagSpec::list(kind))
            .provides(TagSpec::items(kind, LIST_ITEMS, ID_FIELD)),
    );
    registry.register(
        EndpointDef::query(format!("{prefix}.get"), item_path.clone())
            .provides(TagSpec::arg(kind, "id")),
    );
    registry.register(
        EndpointDef::mutation(format!("{prefix}.create"), Method::Post, path)
            .invalidates(TagSpec::list(kind)),
    );
    registry.register(
        EndpointDef::mutation(format!("{prefix}.update"), Method::Patch, item_path.clone())
            .invalidates(TagSpec::arg(kind, "id"))
            .invalidates(TagSpec::list(kind)),
    );
    registry.register(
        EndpointDef::mutation(format!("{prefix}.delete"), Method::Delete, item_path)
            .invalidates(TagSpec::arg(kind, "id"))
            .invalidates(TagSpec::list(kind)),
    );
}

/// Action on one item that changes it and its list membership.
fn item_action(registry: &mut EndpointRegistry, name: &str, method: Method, path: &str, kind: &str) {
    registry.register(
        EndpointDef::mutation(name, method, path)
            .invalidates(TagSpec::arg(kind, "id"))
            .invalidates(TagSpec::list(kind)),
    );
}

impl EndpointRegistry {
    /// Every endpoint the admin console calls, with its tag bindings.
    pub fn admin() -> Self {
        let mut registry = Self::new();

        registry.register(
            EndpointDef::query("orders.list", "/orders")
                .provides(TagSpec::list("Order"))
                .provides(TagSpec::items("Order", LIST_ITEMS, ID_FIELD)),
        );
        registry.register(
            EndpointDef::query("orders.get", "/orders/{id}").provides(TagSpec::arg("Order", "id")),
        );
        item_action(&mut registry, "orders.updateStatus", Method::Patch, "/orders/{id}/status", "Order");
        item_action(&mut registry, "orders.cancel", Method::Post, "/orders/{id}/cancel", "Order");
        registry.register(
            EndpointDef::mutation("orders.assignHub", Method::Patch, "/orders/{id}/hub")
                .invalidates(TagSpec::arg("Order", "id"))
                .invalidates(TagSpec::list("Order"))
                .invalidates(TagSpec::arg("Hub", "hubId")),
        );

        resource(&mut registry, "products", "Product", "/products");
        registry.register(
            EndpointDef::mutation("products.uploadImage", Method::Post, "/products/{id}/images")
                .invalidates(TagSpec::arg("Product", "id")),
        );

        resource(&mut registry, "hubs", "Hub", "/hubs");

        registry.register(
            EndpointDef::query("payouts.list", "/payouts")
                .provides(TagSpec::list("Payout"))
                .provides(TagSpec::items("Payout", LIST_ITEMS, ID_FIELD)),
        );
        registry.register(
            EndpointDef::query("payouts.get", "/payouts/{id}").provides(TagSpec::arg("Payout", "id")),
        );
        item_action(&mut registry, "payouts.approve", Method::Post, "/payouts/{id}/approve", "Payout");
        item_action(&mut registry, "payouts.reject", Method::Post, "/payouts/{id}/reject", "Payout");

        registry.register(
            EndpointDef::query("categories.list", "/categories")
                .provides(TagSpec::list("Category"))
                .provides(TagSpec::items("Category", LIST_ITEMS, ID_FIELD)),
        );
        registry.register(
            EndpointDef::mutation("categories.create", Method::Post, "/categories")
                .invalidates(TagSpec::list("Category"))
                .invalidates(TagSpec::list("Product")),
        );

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::Tag;
    use crate::endpoint::registry::EndpointKind;
    use serde_json::json;

    #[test]
    fn every_mutation_invalidates_something() {
        let registry = EndpointRegistry::admin();
        for def in registry.iter().filter(|d| d.kind == EndpointKind::Mutation) {
            assert!(!def.invalidates.is_empty(), "{} invalidates nothing", def.name);
        }
    }

    #[test]
    fn every_list_query_provides_its_list_tag() {
        let registry = EndpointRegistry::admin();
        for def in registry.iter().filter(|d| d.name.ends_with(".list")) {
            let tags = def.provided_tags(&json!({}), &json!({"data": {"items": []}}));
            assert!(tags.iter().any(Tag::is_list), "{} has no LIST tag", def.name);
        }
    }

    #[test]
    fn catalog_covers_resources() {
        let registry = EndpointRegistry::admin();
        for name in [
            "orders.list",
            "orders.updateStatus",
            "products.create",
            "products.uploadImage",
            "hubs.delete",
            "payouts.approve",
            "categories.create",
        ] {
            registry.get(name).unwrap();
        }
    }

    #[test]
    fn assign_hub_touches_order_and_hub() {
        let registry = EndpointRegistry::admin();
        let tags = registry
            .get("orders.assignHub")
            .unwrap()
            .invalidated_tags(&json!({"id": "o1", "hubId": "h9"}), &json!(null));
        assert!(tags.contains(&Tag::id("Order", "o1")));
        assert!(tags.contains(&Tag::id("Hub", "h9")));
    }
}
