use serde_json::Value;

fn schema_properties<'a>(doc: &'a Value, name: &str) -> &'a serde_json::Map<String, Value> {
    doc.get("components")
        .and_then(|c| c.get("schemas"))
        .and_then(|s| s.get(name))
        .and_then(|t| t.get("properties"))
        .and_then(Value::as_object)
        .unwrap_or_else(|| panic!("components.schemas.{name}.properties must exist"))
}

#[test]
fn openapi_describes_scoped_records() -> anyhow::Result<()> {
    // Build the OpenAPI document the same way the server does
    let doc = salesdesk::docs::build_openapi(8000)?;
    let v = serde_json::to_value(&doc)?;

    let lead = schema_properties(&v, "Lead");
    for k in ["id", "owner_id", "department_id", "company", "status"] {
        assert!(lead.contains_key(k), "OpenAPI Lead schema missing '{}'", k);
    }

    let access = schema_properties(&v, "AccessCheckResponse");
    for k in ["allowed", "scope", "reason"] {
        assert!(access.contains_key(k), "OpenAPI AccessCheckResponse schema missing '{}'", k);
    }

    let paths = v.get("paths").and_then(Value::as_object).expect("paths must exist");
    for p in ["/leads", "/leads/{id}/assign", "/employees/hierarchy", "/rbac/roles/{role_id}/permissions", "/rbac/access"] {
        assert!(paths.contains_key(p), "OpenAPI missing path '{}'", p);
    }

    Ok(())
}

#[test]
fn openapi_declares_bearer_auth_and_server() -> anyhow::Result<()> {
    let doc = salesdesk::docs::build_openapi(8123)?;
    let v = serde_json::to_value(&doc)?;

    assert_eq!(v["components"]["securitySchemes"]["bearerAuth"]["scheme"], "bearer");
    let servers = v["servers"].as_array().expect("servers must be an array");
    assert!(servers.iter().any(|s| s["url"] == "http://localhost:8123"));

    Ok(())
}
