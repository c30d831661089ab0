//! Deterministic generator backed by placeholder templates.
//!
//! Ships a small set of built-in landlord documents. Deployments can add or
//! override templates under `[documents.implementations.template.templates]`.

use crate::{
	DocumentError, DocumentFactory, DocumentInterface, DocumentRegistry, GeneratedDocument,
	GenerationRequest,
};
use async_trait::async_trait;
use std::collections::HashMap;
use vault_types::{
	render_template, ConfigSchema, ImplementationRegistry, Schema, ValidationError,
};

const COMPLIANCE_PACK: &str = "# Compliance Pack\n\n\
Reference: {{reference}}\n\
Prepared: {{generated_on}}\n\
Property: {{property_address}}\n\
Landlord: {{landlord_name}}\n\n\
This pack summarises the certificates held for the property above and the \
dates on which each must be renewed.\n\n\
{{notes}}\n";

const TENANCY_AGREEMENT: &str = "# Assured Shorthold Tenancy Agreement\n\n\
Reference: {{reference}}\n\
Date: {{generated_on}}\n\n\
Landlord: {{landlord_name}}\n\
Tenant: {{tenant_name}}\n\
Property: {{property_address}}\n\
Rent: {{rent_amount}} per {{rent_period}}\n\
Term starts: {{start_date}}\n\n\
{{notes}}\n";

const SECTION_21_NOTICE: &str = "# Notice Requiring Possession (Form 6A)\n\n\
Reference: {{reference}}\n\
Served: {{generated_on}}\n\n\
To: {{tenant_name}}\n\
Of: {{property_address}}\n\n\
You are required to leave the property after {{possession_date}}.\n\n\
Signed on behalf of {{landlord_name}}.\n";

const FORMAL_LETTER: &str = "{{generated_on}}\n\n\
Re: {{subject}}\n\n\
Dear {{recipient_name}},\n\n\
{{intent}}\n\n\
Yours sincerely,\n\
{{sender_name}}\n";

const COMPLAINT_LETTER: &str = "{{generated_on}}\n\n\
Formal complaint: {{subject}}\n\n\
To {{recipient_name}},\n\n\
I am writing to raise a formal complaint. {{intent}}\n\n\
I expect a written response within 14 days.\n\n\
{{sender_name}}\n";

pub struct TemplateGenerator {
	templates: HashMap<String, String>,
}

impl TemplateGenerator {
	pub fn new(templates: HashMap<String, String>) -> Self {
		Self { templates }
	}

	pub fn with_builtin() -> Self {
		let templates = [
			("compliance_pack", COMPLIANCE_PACK),
			("tenancy_agreement", TENANCY_AGREEMENT),
			("section_21_notice", SECTION_21_NOTICE),
			("formal_letter", FORMAL_LETTER),
			("complaint_letter", COMPLAINT_LETTER),
		]
		.into_iter()
		.map(|(k, v)| (k.to_string(), v.to_string()))
		.collect();
		Self::new(templates)
	}
}

#[async_trait]
impl DocumentInterface for TemplateGenerator {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(TemplateSchema)
	}

	async fn generate(
		&self,
		request: &GenerationRequest,
	) -> Result<GeneratedDocument, DocumentError> {
		let template = self
			.templates
			.get(&request.document_type)
			.ok_or_else(|| DocumentError::UnknownDocumentType(request.document_type.clone()))?;

		Ok(GeneratedDocument {
			document_type: request.document_type.clone(),
			filename: request.filename(),
			content: render_template(template, &request.variables()),
			generator: Registry::NAME.to_string(),
		})
	}
}

pub struct TemplateSchema;

impl ConfigSchema for TemplateSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)?;
		match config.get("templates") {
			None => Ok(()),
			Some(toml::Value::Table(table)) => {
				for (name, value) in table {
					if !value.is_str() {
						return Err(ValidationError::TypeMismatch {
							field: format!("templates.{}", name),
							expected: "a string",
							actual: value.type_str(),
						});
					}
				}
				Ok(())
			},
			Some(other) => Err(ValidationError::TypeMismatch {
				field: "templates".to_string(),
				expected: "a table",
				actual: other.type_str(),
			}),
		}
	}
}

/// Builds the template generator.
///
/// Configuration parameters:
/// - `templates`: table of document type to template text, merged over the
///   built-in set
pub fn create_generator(config: &toml::Value) -> Result<Box<dyn DocumentInterface>, DocumentError> {
	TemplateSchema
		.validate(config)
		.map_err(|e| DocumentError::Configuration(e.to_string()))?;

	let mut generator = TemplateGenerator::with_builtin();
	if let Some(table) = config.get("templates").and_then(|v| v.as_table()) {
		for (name, value) in table {
			if let Some(text) = value.as_str() {
				generator.templates.insert(name.clone(), text.to_string());
			}
		}
	}
	Ok(Box::new(generator))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "template";
	type Factory = DocumentFactory;

	fn factory() -> Self::Factory {
		create_generator
	}
}

impl DocumentRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_renders_inputs() {
		let generator = TemplateGenerator::with_builtin();
		let mut request = GenerationRequest::new("ord-42", "section_21_notice");
		request
			.inputs
			.insert("tenant_name".into(), serde_json::json!("Sam Tenant"));
		request
			.inputs
			.insert("property_address".into(), serde_json::json!("1 High St"));

		let doc = generator.generate(&request).await.unwrap();
		assert!(doc.content.contains("To: Sam Tenant"));
		assert!(doc.content.contains("Of: 1 High St"));
		assert!(doc.content.contains("Reference: ord-42"));
		assert!(!doc.content.contains("{{"));
		assert_eq!(doc.generator, "template");
	}

	#[tokio::test]
	async fn test_unknown_type_is_error() {
		let generator = TemplateGenerator::with_builtin();
		let request = GenerationRequest::new("ord-1", "moon_lease");
		assert!(matches!(
			generator.generate(&request).await,
			Err(DocumentError::UnknownDocumentType(t)) if t == "moon_lease"
		));
	}

	#[tokio::test]
	async fn test_config_templates_override_builtin() {
		let config: toml::Value = toml::from_str(
			r#"
[templates]
formal_letter = "Custom {{reference}}"
hmo_checklist = "HMO {{reference}}"
"#,
		)
		.unwrap();
		let generator = create_generator(&config).unwrap();

		let doc = generator
			.generate(&GenerationRequest::new("r1", "formal_letter"))
			.await
			.unwrap();
		assert_eq!(doc.content, "Custom r1");

		let doc = generator
			.generate(&GenerationRequest::new("r2", "hmo_checklist"))
			.await
			.unwrap();
		assert_eq!(doc.content, "HMO r2");
	}

	#[test]
	fn test_schema_rejects_non_string_template() {
		let config: toml::Value = toml::from_str("[templates]\nbad = 1\n").unwrap();
		assert!(TemplateSchema.validate(&config).is_err());
	}
}
