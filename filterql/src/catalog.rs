//! Registry of filterable fields and the operators each field type supports.
//!
//! The catalogs are assembled once at startup and then shared read-only. Every field type must resolve to a
//! non-empty operator list; [`FilterCatalog::new`] refuses to build otherwise so a misconfiguration never
//! surfaces halfway through building a filter.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, ConfigurationError};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldId(String);

impl FieldId {
    pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for FieldId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for FieldId {
    fn from(id: &str) -> Self { Self(id.to_string()) }
}

impl From<String> for FieldId {
    fn from(id: String) -> Self { Self(id) }
}

impl AsRef<str> for FieldId {
    fn as_ref(&self) -> &str { &self.0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Select,
    Date,
    Number,
    Boolean,
}

impl FieldType {
    pub const ALL: [FieldType; 5] = [FieldType::Text, FieldType::Select, FieldType::Date, FieldType::Number, FieldType::Boolean];

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::Text => "text",
            FieldType::Select => "select",
            FieldType::Date => "date",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Comparison operators. Ids serialize in camelCase; the snake_case spellings written by older clients are
/// accepted when reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    Equals,
    #[serde(alias = "not_equals")]
    NotEquals,
    Contains,
    #[serde(alias = "not_contains")]
    NotContains,
    #[serde(alias = "starts_with")]
    StartsWith,
    #[serde(alias = "ends_with")]
    EndsWith,
    #[serde(alias = "greater_than")]
    Gt,
    #[serde(alias = "greater_than_or_equal", alias = "greater_equal")]
    Gte,
    #[serde(alias = "less_than")]
    Lt,
    #[serde(alias = "less_than_or_equal", alias = "less_equal")]
    Lte,
    Before,
    After,
    Between,
    In,
    #[serde(alias = "not_in")]
    NotIn,
    #[serde(alias = "last_days")]
    LastDays,
    #[serde(alias = "next_days")]
    NextDays,
    #[serde(alias = "is_empty")]
    IsEmpty,
    #[serde(alias = "is_not_empty")]
    IsNotEmpty,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Equals => "equals",
            Operator::NotEquals => "notEquals",
            Operator::Contains => "contains",
            Operator::NotContains => "notContains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Before => "before",
            Operator::After => "after",
            Operator::Between => "between",
            Operator::In => "in",
            Operator::NotIn => "notIn",
            Operator::LastDays => "lastDays",
            Operator::NextDays => "nextDays",
            Operator::IsEmpty => "isEmpty",
            Operator::IsNotEmpty => "isNotEmpty",
        }
    }

    /// Operators that ignore the rule value entirely.
    pub fn takes_value(&self) -> bool { !matches!(self, Operator::IsEmpty | Operator::IsNotEmpty) }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

#[derive(Debug, thiserror::Error, PartialEq)]
#[error("unknown operator: {0}")]
pub struct UnknownOperator(pub String);

impl FromStr for Operator {
    type Err = UnknownOperator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.to_string())).map_err(|_| UnknownOperator(s.to_string()))
    }
}

/// An operator as offered for a field type, with its display label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperatorSpec {
    pub id: Operator,
    pub label: String,
}

impl OperatorSpec {
    pub fn new(id: Operator, label: impl Into<String>) -> Self { Self { id, label: label.into() } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterableField {
    pub id: FieldId,
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub category: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<String>,
    #[serde(default)]
    pub is_custom: bool,
    /// Column the remote backend knows this field by. Defaults to the id, or to the `custom_fields` JSON path
    /// for custom fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<String>,
}

impl FilterableField {
    pub fn new(id: impl Into<FieldId>, name: impl Into<String>, field_type: FieldType, category: impl Into<String>) -> Self {
        Self { id: id.into(), name: name.into(), field_type, category: category.into(), options: Vec::new(), is_custom: false, column: None }
    }

    pub fn custom(id: impl Into<FieldId>, name: impl Into<String>, field_type: FieldType) -> Self {
        Self { is_custom: true, ..Self::new(id, name, field_type, "personalized") }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn remote_column(&self) -> String {
        match (&self.column, self.is_custom) {
            (Some(column), _) => column.clone(),
            (None, true) => format!("custom_fields->>{}", self.id),
            (None, false) => self.id.to_string(),
        }
    }
}

/// Insertion-ordered field registry with catalog-wide unique ids.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldCatalog {
    fields: IndexMap<FieldId, FilterableField>,
}

impl FieldCatalog {
    pub fn new() -> Self { Self::default() }

    /// Registers `fields` in order, failing on the first blank or repeated id.
    pub fn from_fields(fields: impl IntoIterator<Item = FilterableField>) -> Result<Self, CatalogError> {
        let mut catalog = Self::new();
        for field in fields {
            catalog.register(field)?;
        }
        Ok(catalog)
    }

    pub fn register(&mut self, field: FilterableField) -> Result<(), CatalogError> {
        if field.id.as_str().trim().is_empty() {
            return Err(CatalogError::BlankFieldId);
        }
        if self.fields.contains_key(&field.id) {
            return Err(CatalogError::DuplicateField(field.id));
        }
        self.fields.insert(field.id.clone(), field);
        Ok(())
    }

    pub fn get(&self, id: &FieldId) -> Option<&FilterableField> { self.fields.get(id) }

    pub fn field_type(&self, id: &FieldId) -> Option<FieldType> { self.fields.get(id).map(|f| f.field_type) }

    pub fn first(&self) -> Option<&FilterableField> { self.fields.first().map(|(_, f)| f) }

    pub fn iter(&self) -> impl Iterator<Item = &FilterableField> { self.fields.values() }

    pub fn len(&self) -> usize { self.fields.len() }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    /// Fields grouped by category, categories in first-seen order.
    pub fn by_category(&self) -> IndexMap<&str, Vec<&FilterableField>> {
        let mut grouped: IndexMap<&str, Vec<&FilterableField>> = IndexMap::new();
        for field in self.fields.values() {
            grouped.entry(field.category.as_str()).or_default().push(field);
        }
        grouped
    }
}

impl TryFrom<Vec<FilterableField>> for FieldCatalog {
    type Error = CatalogError;

    fn try_from(fields: Vec<FilterableField>) -> Result<Self, Self::Error> {
        let mut catalog = FieldCatalog::new();
        for field in fields {
            catalog.register(field)?;
        }
        Ok(catalog)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorCatalog {
    by_type: BTreeMap<FieldType, Vec<OperatorSpec>>,
}

impl OperatorCatalog {
    /// Every field type must map to at least one operator.
    pub fn new(by_type: BTreeMap<FieldType, Vec<OperatorSpec>>) -> Result<Self, ConfigurationError> {
        for field_type in FieldType::ALL {
            if by_type.get(&field_type).map_or(true, |ops| ops.is_empty()) {
                return Err(ConfigurationError::NoOperators(field_type));
            }
        }
        Ok(Self { by_type })
    }

    /// The process-wide default operator catalog.
    pub fn builtin() -> &'static OperatorCatalog {
        static BUILTIN: OnceLock<OperatorCatalog> = OnceLock::new();
        BUILTIN.get_or_init(|| OperatorCatalog { by_type: builtin_operators() })
    }

    pub fn operators_for(&self, field_type: FieldType) -> &[OperatorSpec] {
        // construction guarantees every type is present
        self.by_type.get(&field_type).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn default_operator(&self, field_type: FieldType) -> Operator {
        self.operators_for(field_type).first().map(|spec| spec.id).unwrap_or(Operator::Equals)
    }

    pub fn is_legal(&self, field_type: FieldType, operator: Operator) -> bool {
        self.operators_for(field_type).iter().any(|spec| spec.id == operator)
    }
}

impl Default for OperatorCatalog {
    fn default() -> Self { Self::builtin().clone() }
}

fn builtin_operators() -> BTreeMap<FieldType, Vec<OperatorSpec>> {
    use Operator::*;
    let spec = |id, label: &str| OperatorSpec::new(id, label);

    let mut by_type = BTreeMap::new();
    by_type.insert(
        FieldType::Text,
        vec![
            spec(Equals, "é igual a"),
            spec(NotEquals, "não é igual a"),
            spec(Contains, "contém"),
            spec(NotContains, "não contém"),
            spec(StartsWith, "começa com"),
            spec(EndsWith, "termina com"),
            spec(IsEmpty, "está vazio"),
            spec(IsNotEmpty, "não está vazio"),
        ],
    );
    by_type.insert(
        FieldType::Select,
        vec![
            spec(Equals, "é igual a"),
            spec(NotEquals, "não é igual a"),
            spec(In, "está em"),
            spec(NotIn, "não está em"),
            spec(IsEmpty, "está vazio"),
            spec(IsNotEmpty, "não está vazio"),
        ],
    );
    by_type.insert(
        FieldType::Date,
        vec![
            spec(Equals, "é igual a"),
            spec(Before, "é antes de"),
            spec(After, "é depois de"),
            spec(Between, "está entre"),
            spec(NotEquals, "não é igual a"),
            spec(LastDays, "últimos X dias"),
            spec(NextDays, "próximos X dias"),
            spec(IsEmpty, "está vazio"),
            spec(IsNotEmpty, "não está vazio"),
        ],
    );
    by_type.insert(
        FieldType::Number,
        vec![
            spec(Equals, "é igual a"),
            spec(NotEquals, "não é igual a"),
            spec(Gt, "é maior que"),
            spec(Gte, "é maior ou igual a"),
            spec(Lt, "é menor que"),
            spec(Lte, "é menor ou igual a"),
            spec(Between, "está entre"),
            spec(IsEmpty, "está vazio"),
            spec(IsNotEmpty, "não está vazio"),
        ],
    );
    by_type.insert(
        FieldType::Boolean,
        vec![spec(Equals, "é igual a"), spec(NotEquals, "não é igual a"), spec(IsEmpty, "está vazio"), spec(IsNotEmpty, "não está vazio")],
    );
    by_type
}

/// Field and operator catalogs validated together.
#[derive(Debug, Clone)]
pub struct FilterCatalog {
    fields: FieldCatalog,
    operators: OperatorCatalog,
}

impl FilterCatalog {
    pub fn new(fields: FieldCatalog, operators: OperatorCatalog) -> Result<Self, ConfigurationError> {
        for field in fields.iter() {
            if operators.operators_for(field.field_type).is_empty() {
                return Err(ConfigurationError::NoOperators(field.field_type));
            }
        }
        Ok(Self { fields, operators })
    }

    /// Built-in client fields with the default operators.
    pub fn builtin() -> Arc<FilterCatalog> {
        static BUILTIN: OnceLock<Arc<FilterCatalog>> = OnceLock::new();
        BUILTIN
            .get_or_init(|| Arc::new(FilterCatalog { fields: builtin_client_fields(), operators: OperatorCatalog::builtin().clone() }))
            .clone()
    }

    /// Built-in client fields plus the given custom fields.
    pub fn with_custom_fields(custom: Vec<FilterableField>) -> Result<Self, ConfigurationError> {
        let mut fields = builtin_client_fields();
        for field in custom {
            fields.register(FilterableField { is_custom: true, ..field })?;
        }
        Self::new(fields, OperatorCatalog::builtin().clone())
    }

    pub fn fields(&self) -> &FieldCatalog { &self.fields }

    pub fn operators(&self) -> &OperatorCatalog { &self.operators }

    pub fn field(&self, id: &FieldId) -> Option<&FilterableField> { self.fields.get(id) }

    pub fn field_type(&self, id: &FieldId) -> Option<FieldType> { self.fields.field_type(id) }

    /// Operators legal for a field, or `None` if the field is not registered.
    pub fn operators_for_field(&self, id: &FieldId) -> Option<&[OperatorSpec]> {
        self.field_type(id).map(|field_type| self.operators.operators_for(field_type))
    }
}

/// The dashboard's fixed contact properties.
pub fn builtin_client_fields() -> FieldCatalog {
    let mut catalog = FieldCatalog::new();
    for field in builtin_field_list() {
        let registered = catalog.register(field);
        debug_assert!(registered.is_ok(), "built-in client fields: {registered:?}");
    }
    catalog
}

fn builtin_field_list() -> Vec<FilterableField> {
    use FieldType::*;
    vec![
        FilterableField::new("name", "Nome", Text, "basic"),
        FilterableField::new("email", "Email", Text, "basic"),
        FilterableField::new("phone", "Telefone", Text, "basic"),
        FilterableField::new("address", "Endereço", Text, "basic"),
        FilterableField::new("created_at", "Data de Criação", Date, "basic"),
        FilterableField::new("updated_at", "Última Atualização", Date, "basic"),
        FilterableField::new("consultation_stage", "Estágio de Consulta", Select, "kanban").with_options([
            "Nova consulta",
            "Qualificado",
            "Chamada agendada",
            "Preparando proposta",
            "Proposta enviada",
            "Acompanhamento",
            "Negociação",
            "Fatura enviada",
            "Fatura paga – ganho",
            "Projeto cancelado – perdido",
        ]),
        FilterableField::new("category", "Categoria", Text, "commercial"),
        FilterableField::new("types", "Tipos", Text, "commercial"),
        FilterableField::new("client_name", "Nome do Cliente", Text, "commercial"),
        FilterableField::new("client_size", "Porte do Cliente", Select, "commercial").with_options(["Pequeno", "Médio", "Grande"]),
        FilterableField::new("status", "Status", Select, "commercial").with_options([
            "Active",
            "Inactive",
            "Ganhos",
            "Perdidos",
            "Em Andamento",
            "Qualificado",
            "Não Qualificado",
        ]),
        FilterableField::new("sales", "Vendas", Number, "commercial"),
        FilterableField::new("budget", "Orçamento", Number, "commercial"),
        FilterableField::new("rating", "Avaliação", Number, "commercial"),
        FilterableField::new("has_whatsapp", "Possui WhatsApp", Boolean, "commercial"),
        FilterableField::new("last_contact", "Último Contato", Date, "temporal"),
        FilterableField::new("last_message_time", "Última Mensagem", Date, "temporal"),
        FilterableField::new("contract_date", "Data do Contrato", Date, "temporal"),
        FilterableField::new("cpf_cnpj", "CPF/CNPJ", Text, "documents"),
        FilterableField::new("contract_number", "Número do Contrato", Text, "documents"),
    ]
}
