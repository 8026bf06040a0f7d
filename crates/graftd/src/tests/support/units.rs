//! Component units and descriptor documents used across the suites.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::{Value, json};

use graft_components::{
    CompiledUnit, Component, Handler, InvocationError, RequestContext, RoleMetadata,
};

/// Handler answering `GET` with a fixed body.
struct Text {
    body: String,
}

impl Component for Text {
    fn as_handler(&self) -> Option<&dyn Handler> {
        Some(self)
    }
}

impl Handler for Text {
    fn get(&self, ctx: &mut RequestContext) -> Result<(), InvocationError> {
        ctx.response_mut().write(&self.body);
        Ok(())
    }
}

/// Compiled unit whose instance answers `GET` with `body`.
pub fn text_unit(metadata: RoleMetadata, body: &str) -> CompiledUnit {
    CompiledUnit {
        source: PathBuf::from(format!("components/{}.json", metadata.identity())),
        component: Arc::new(Text {
            body: body.to_owned(),
        }),
        metadata: Some(metadata),
    }
}

/// Builder for descriptor documents naming one of the built-in factories.
#[derive(Debug, Clone)]
pub struct Descriptor {
    factory: &'static str,
    role: Option<Value>,
    settings: Value,
}

impl Descriptor {
    /// `static-text` handler called `name`, routed by `pattern`.
    pub fn text_handler(name: &str, pattern: &str, body: &str) -> Self {
        Self {
            factory: "static-text",
            role: Some(json!({
                "kind": "handler",
                "type": format!("app.{name}"),
                "name": name,
                "patterns": [pattern],
            })),
            settings: json!({ "body": body }),
        }
    }

    /// `response-header` filter called `name`, wrapped around `pattern`.
    pub fn header_filter(name: &str, pattern: &str, header: &str, value: &str) -> Self {
        Self {
            factory: "response-header",
            role: Some(json!({
                "kind": "filter",
                "type": format!("app.{name}"),
                "name": name,
                "patterns": [pattern],
            })),
            settings: json!({ "name": header, "value": value }),
        }
    }

    /// `lifecycle-logger` attached as a context listener.
    pub fn context_listener(name: &str) -> Self {
        Self {
            factory: "lifecycle-logger",
            role: Some(json!({
                "kind": "context_listener",
                "type": format!("app.{name}"),
            })),
            settings: json!({ "label": name }),
        }
    }

    /// `connection-probe` handler routed by `pattern`.
    pub fn connection_probe(pattern: &str) -> Self {
        Self {
            factory: "connection-probe",
            role: Some(json!({
                "kind": "handler",
                "type": "app.Probe",
                "name": "probe",
                "patterns": [pattern],
            })),
            settings: Value::Null,
        }
    }

    /// Drops the role declaration, turning the unit into a non-component.
    #[must_use]
    pub fn without_role(mut self) -> Self {
        self.role = None;
        self
    }

    /// Renders the descriptor as JSON text.
    #[must_use]
    pub fn render(&self) -> String {
        let mut document = json!({ "factory": self.factory, "settings": self.settings });
        if let (Some(role), Some(object)) = (&self.role, document.as_object_mut()) {
            object.insert(String::from("role"), role.clone());
        }
        document.to_string()
    }
}
