//! Element schemas driving the upsert walk.
//!
//! A schema lists a type's elements in declaration order with their
//! cardinality and kind. Choice-typed elements (`value[x]`) list their
//! candidates; the first one present in the document wins. Types and
//! elements not declared here are inferred from the JSON shape, so unknown
//! resource types still store and round-trip.

use serde_json::Value;

use ironfhir_storage::Cardinality;

/// How the walker treats an element's values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Primitive,
    /// A `code` primitive interned against the enclosing (system, version).
    Code,
    Composite,
    Reference,
    Coding,
    Contained,
}

#[derive(Debug, Clone, Copy)]
pub struct Choice {
    pub suffix: &'static str,
    pub kind: ElementKind,
    pub type_name: Option<&'static str>,
}

#[derive(Debug, Clone, Copy)]
pub struct ElementDef {
    /// JSON property name; for choice elements, the common prefix.
    pub name: &'static str,
    pub card: Cardinality,
    pub kind: ElementKind,
    /// Child type schema for composites.
    pub type_name: Option<&'static str>,
    pub choices: &'static [Choice],
}

impl ElementDef {
    pub const fn prim(name: &'static str) -> Self {
        Self {
            name,
            card: Cardinality::One,
            kind: ElementKind::Primitive,
            type_name: None,
            choices: &[],
        }
    }

    pub const fn prim_many(name: &'static str) -> Self {
        Self {
            name,
            card: Cardinality::Many,
            kind: ElementKind::Primitive,
            type_name: None,
            choices: &[],
        }
    }

    pub const fn code(name: &'static str) -> Self {
        Self {
            name,
            card: Cardinality::One,
            kind: ElementKind::Code,
            type_name: None,
            choices: &[],
        }
    }

    pub const fn comp(name: &'static str, type_name: &'static str) -> Self {
        Self {
            name,
            card: Cardinality::One,
            kind: ElementKind::Composite,
            type_name: Some(type_name),
            choices: &[],
        }
    }

    pub const fn comp_many(name: &'static str, type_name: &'static str) -> Self {
        Self {
            name,
            card: Cardinality::Many,
            kind: ElementKind::Composite,
            type_name: Some(type_name),
            choices: &[],
        }
    }

    pub const fn reference(name: &'static str) -> Self {
        Self {
            name,
            card: Cardinality::One,
            kind: ElementKind::Reference,
            type_name: Some("Reference"),
            choices: &[],
        }
    }

    pub const fn reference_many(name: &'static str) -> Self {
        Self {
            name,
            card: Cardinality::Many,
            kind: ElementKind::Reference,
            type_name: Some("Reference"),
            choices: &[],
        }
    }

    pub const fn choice(name: &'static str, choices: &'static [Choice]) -> Self {
        Self {
            name,
            card: Cardinality::One,
            kind: ElementKind::Primitive,
            type_name: None,
            choices,
        }
    }

    pub const fn is_choice(&self) -> bool {
        !self.choices.is_empty()
    }
}

const fn prim_choice(suffix: &'static str) -> Choice {
    Choice {
        suffix,
        kind: ElementKind::Primitive,
        type_name: None,
    }
}

const fn comp_choice(suffix: &'static str) -> Choice {
    Choice {
        suffix,
        kind: ElementKind::Composite,
        type_name: Some(suffix),
    }
}

/// A declared type: its elements plus, when the type carries a terminology
/// context, the attribute that provides the code system for nested `Code`
/// elements.
#[derive(Debug, Clone, Copy)]
pub struct TypeSchema {
    pub name: &'static str,
    pub system_key: Option<&'static str>,
    pub elements: &'static [ElementDef],
}

const HUMAN_NAME: TypeSchema = TypeSchema {
    name: "HumanName",
    system_key: None,
    elements: &[
        ElementDef::prim("use"),
        ElementDef::prim("text"),
        ElementDef::prim("family"),
        ElementDef::prim_many("given"),
        ElementDef::prim_many("prefix"),
        ElementDef::prim_many("suffix"),
        ElementDef::comp("period", "Period"),
    ],
};

const IDENTIFIER: TypeSchema = TypeSchema {
    name: "Identifier",
    system_key: None,
    elements: &[
        ElementDef::prim("use"),
        ElementDef::comp("type", "CodeableConcept"),
        ElementDef::prim("system"),
        ElementDef::prim("value"),
        ElementDef::comp("period", "Period"),
        ElementDef::reference("assigner"),
    ],
};

const CODEABLE_CONCEPT: TypeSchema = TypeSchema {
    name: "CodeableConcept",
    system_key: None,
    elements: &[
        ElementDef {
            name: "coding",
            card: Cardinality::Many,
            kind: ElementKind::Coding,
            type_name: Some("Coding"),
            choices: &[],
        },
        ElementDef::prim("text"),
    ],
};

const CODING: TypeSchema = TypeSchema {
    name: "Coding",
    system_key: Some("system"),
    elements: &[
        ElementDef::prim("system"),
        ElementDef::prim("version"),
        ElementDef::code("code"),
        ElementDef::prim("display"),
        ElementDef::prim("userSelected"),
    ],
};

const REFERENCE: TypeSchema = TypeSchema {
    name: "Reference",
    system_key: None,
    elements: &[
        // "reference" itself is resolved by the walker.
        ElementDef::prim("type"),
        ElementDef::comp("identifier", "Identifier"),
        ElementDef::prim("display"),
    ],
};

const QUANTITY: TypeSchema = TypeSchema {
    name: "Quantity",
    system_key: Some("system"),
    elements: &[
        ElementDef::prim("value"),
        ElementDef::prim("comparator"),
        ElementDef::prim("unit"),
        ElementDef::prim("system"),
        ElementDef::code("code"),
    ],
};

const PERIOD: TypeSchema = TypeSchema {
    name: "Period",
    system_key: None,
    elements: &[ElementDef::prim("start"), ElementDef::prim("end")],
};

const RANGE: TypeSchema = TypeSchema {
    name: "Range",
    system_key: None,
    elements: &[
        ElementDef::comp("low", "Quantity"),
        ElementDef::comp("high", "Quantity"),
    ],
};

const RATIO: TypeSchema = TypeSchema {
    name: "Ratio",
    system_key: None,
    elements: &[
        ElementDef::comp("numerator", "Quantity"),
        ElementDef::comp("denominator", "Quantity"),
    ],
};

const ADDRESS: TypeSchema = TypeSchema {
    name: "Address",
    system_key: None,
    elements: &[
        ElementDef::prim("use"),
        ElementDef::prim("type"),
        ElementDef::prim("text"),
        ElementDef::prim_many("line"),
        ElementDef::prim("city"),
        ElementDef::prim("district"),
        ElementDef::prim("state"),
        ElementDef::prim("postalCode"),
        ElementDef::prim("country"),
        ElementDef::comp("period", "Period"),
    ],
};

const CONTACT_POINT: TypeSchema = TypeSchema {
    name: "ContactPoint",
    system_key: None,
    elements: &[
        ElementDef::prim("system"),
        ElementDef::prim("value"),
        ElementDef::prim("use"),
        ElementDef::prim("rank"),
        ElementDef::comp("period", "Period"),
    ],
};

const ANNOTATION: TypeSchema = TypeSchema {
    name: "Annotation",
    system_key: None,
    elements: &[
        ElementDef::choice(
            "author",
            &[
                Choice {
                    suffix: "Reference",
                    kind: ElementKind::Reference,
                    type_name: Some("Reference"),
                },
                prim_choice("String"),
            ],
        ),
        ElementDef::prim("time"),
        ElementDef::prim("text"),
    ],
};

const META: TypeSchema = TypeSchema {
    name: "Meta",
    system_key: None,
    elements: &[
        ElementDef::prim_many("profile"),
        ElementDef {
            name: "security",
            card: Cardinality::Many,
            kind: ElementKind::Coding,
            type_name: Some("Coding"),
            choices: &[],
        },
        ElementDef {
            name: "tag",
            card: Cardinality::Many,
            kind: ElementKind::Coding,
            type_name: Some("Coding"),
            choices: &[],
        },
        ElementDef::prim("source"),
    ],
};

const NARRATIVE: TypeSchema = TypeSchema {
    name: "Narrative",
    system_key: None,
    elements: &[ElementDef::prim("status"), ElementDef::prim("div")],
};

const PATIENT_CONTACT: TypeSchema = TypeSchema {
    name: "PatientContact",
    system_key: None,
    elements: &[
        ElementDef::comp_many("relationship", "CodeableConcept"),
        ElementDef::comp("name", "HumanName"),
        ElementDef::comp_many("telecom", "ContactPoint"),
        ElementDef::comp("address", "Address"),
        ElementDef::prim("gender"),
        ElementDef::reference("organization"),
        ElementDef::comp("period", "Period"),
    ],
};

const PATIENT_COMMUNICATION: TypeSchema = TypeSchema {
    name: "PatientCommunication",
    system_key: None,
    elements: &[
        ElementDef::comp("language", "CodeableConcept"),
        ElementDef::prim("preferred"),
    ],
};

const PATIENT_LINK: TypeSchema = TypeSchema {
    name: "PatientLink",
    system_key: None,
    elements: &[ElementDef::reference("other"), ElementDef::prim("type")],
};

const PATIENT: TypeSchema = TypeSchema {
    name: "Patient",
    system_key: None,
    elements: &[
        ElementDef::comp_many("identifier", "Identifier"),
        ElementDef::prim("active"),
        ElementDef::comp_many("name", "HumanName"),
        ElementDef::comp_many("telecom", "ContactPoint"),
        ElementDef::prim("gender"),
        ElementDef::prim("birthDate"),
        ElementDef::choice(
            "deceased",
            &[prim_choice("Boolean"), prim_choice("DateTime")],
        ),
        ElementDef::comp_many("address", "Address"),
        ElementDef::comp("maritalStatus", "CodeableConcept"),
        ElementDef::choice(
            "multipleBirth",
            &[prim_choice("Boolean"), prim_choice("Integer")],
        ),
        ElementDef::comp_many("contact", "PatientContact"),
        ElementDef::comp_many("communication", "PatientCommunication"),
        ElementDef::reference_many("generalPractitioner"),
        ElementDef::reference("managingOrganization"),
        ElementDef::comp_many("link", "PatientLink"),
    ],
};

const OBSERVATION_REFERENCE_RANGE: TypeSchema = TypeSchema {
    name: "ObservationReferenceRange",
    system_key: None,
    elements: &[
        ElementDef::comp("low", "Quantity"),
        ElementDef::comp("high", "Quantity"),
        ElementDef::comp("type", "CodeableConcept"),
        ElementDef::comp_many("appliesTo", "CodeableConcept"),
        ElementDef::comp("age", "Range"),
        ElementDef::prim("text"),
    ],
};

const OBSERVATION_VALUE_CHOICES: &[Choice] = &[
    comp_choice("Quantity"),
    comp_choice("CodeableConcept"),
    prim_choice("String"),
    prim_choice("Boolean"),
    prim_choice("Integer"),
    comp_choice("Range"),
    comp_choice("Ratio"),
    prim_choice("Time"),
    prim_choice("DateTime"),
    comp_choice("Period"),
];

const OBSERVATION_COMPONENT: TypeSchema = TypeSchema {
    name: "ObservationComponent",
    system_key: None,
    elements: &[
        ElementDef::comp("code", "CodeableConcept"),
        ElementDef::choice("value", OBSERVATION_VALUE_CHOICES),
        ElementDef::comp("dataAbsentReason", "CodeableConcept"),
        ElementDef::comp_many("interpretation", "CodeableConcept"),
        ElementDef::comp_many("referenceRange", "ObservationReferenceRange"),
    ],
};

const OBSERVATION: TypeSchema = TypeSchema {
    name: "Observation",
    system_key: None,
    elements: &[
        ElementDef::comp_many("identifier", "Identifier"),
        ElementDef::reference_many("basedOn"),
        ElementDef::reference_many("partOf"),
        ElementDef::prim("status"),
        ElementDef::comp_many("category", "CodeableConcept"),
        ElementDef::comp("code", "CodeableConcept"),
        ElementDef::reference("subject"),
        ElementDef::reference("encounter"),
        ElementDef::choice(
            "effective",
            &[
                prim_choice("DateTime"),
                comp_choice("Period"),
                prim_choice("Instant"),
            ],
        ),
        ElementDef::prim("issued"),
        ElementDef::reference_many("performer"),
        ElementDef::choice("value", OBSERVATION_VALUE_CHOICES),
        ElementDef::comp("dataAbsentReason", "CodeableConcept"),
        ElementDef::comp_many("interpretation", "CodeableConcept"),
        ElementDef::comp_many("note", "Annotation"),
        ElementDef::comp("bodySite", "CodeableConcept"),
        ElementDef::comp("method", "CodeableConcept"),
        ElementDef::reference("specimen"),
        ElementDef::reference("device"),
        ElementDef::comp_many("referenceRange", "ObservationReferenceRange"),
        ElementDef::reference_many("hasMember"),
        ElementDef::reference_many("derivedFrom"),
        ElementDef::comp_many("component", "ObservationComponent"),
    ],
};

const CODE_SYSTEM_CONCEPT: TypeSchema = TypeSchema {
    name: "CodeSystemConcept",
    system_key: None,
    elements: &[
        ElementDef::code("code"),
        ElementDef::prim("display"),
        ElementDef::prim("definition"),
        ElementDef::comp_many("concept", "CodeSystemConcept"),
    ],
};

const CODE_SYSTEM: TypeSchema = TypeSchema {
    name: "CodeSystem",
    system_key: Some("url"),
    elements: &[
        ElementDef::prim("url"),
        ElementDef::comp_many("identifier", "Identifier"),
        ElementDef::prim("version"),
        ElementDef::prim("name"),
        ElementDef::prim("title"),
        ElementDef::prim("status"),
        ElementDef::prim("experimental"),
        ElementDef::prim("content"),
        ElementDef::comp_many("concept", "CodeSystemConcept"),
    ],
};

const VALUE_SET_CONCEPT: TypeSchema = TypeSchema {
    name: "ValueSetConcept",
    system_key: None,
    elements: &[ElementDef::code("code"), ElementDef::prim("display")],
};

const VALUE_SET_INCLUDE: TypeSchema = TypeSchema {
    name: "ValueSetInclude",
    system_key: Some("system"),
    elements: &[
        ElementDef::prim("system"),
        ElementDef::prim("version"),
        ElementDef::comp_many("concept", "ValueSetConcept"),
        ElementDef::prim_many("valueSet"),
    ],
};

const VALUE_SET_COMPOSE: TypeSchema = TypeSchema {
    name: "ValueSetCompose",
    system_key: None,
    elements: &[
        ElementDef::prim("lockedDate"),
        ElementDef::prim("inactive"),
        ElementDef::comp_many("include", "ValueSetInclude"),
        ElementDef::comp_many("exclude", "ValueSetInclude"),
    ],
};

const VALUE_SET: TypeSchema = TypeSchema {
    name: "ValueSet",
    system_key: None,
    elements: &[
        ElementDef::prim("url"),
        ElementDef::comp_many("identifier", "Identifier"),
        ElementDef::prim("version"),
        ElementDef::prim("name"),
        ElementDef::prim("title"),
        ElementDef::prim("status"),
        ElementDef::prim("experimental"),
        ElementDef::comp("compose", "ValueSetCompose"),
    ],
};

fn lookup(name: &str) -> Option<&'static TypeSchema> {
    match name {
        "HumanName" => Some(&HUMAN_NAME),
        "Identifier" => Some(&IDENTIFIER),
        "CodeableConcept" => Some(&CODEABLE_CONCEPT),
        "Coding" => Some(&CODING),
        "Reference" => Some(&REFERENCE),
        "Quantity" => Some(&QUANTITY),
        "Period" => Some(&PERIOD),
        "Range" => Some(&RANGE),
        "Ratio" => Some(&RATIO),
        "Address" => Some(&ADDRESS),
        "ContactPoint" => Some(&CONTACT_POINT),
        "Annotation" => Some(&ANNOTATION),
        "Meta" => Some(&META),
        "Narrative" => Some(&NARRATIVE),
        "Patient" => Some(&PATIENT),
        "PatientContact" => Some(&PATIENT_CONTACT),
        "PatientCommunication" => Some(&PATIENT_COMMUNICATION),
        "PatientLink" => Some(&PATIENT_LINK),
        "Observation" => Some(&OBSERVATION),
        "ObservationReferenceRange" => Some(&OBSERVATION_REFERENCE_RANGE),
        "ObservationComponent" => Some(&OBSERVATION_COMPONENT),
        "CodeSystem" => Some(&CODE_SYSTEM),
        "CodeSystemConcept" => Some(&CODE_SYSTEM_CONCEPT),
        "ValueSet" => Some(&VALUE_SET),
        "ValueSetCompose" => Some(&VALUE_SET_COMPOSE),
        "ValueSetInclude" => Some(&VALUE_SET_INCLUDE),
        "ValueSetConcept" => Some(&VALUE_SET_CONCEPT),
        _ => None,
    }
}

/// Registry of declared type schemas.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaRegistry;

impl SchemaRegistry {
    pub fn new() -> Self {
        Self
    }

    pub fn type_schema(&self, name: &str) -> Option<&'static TypeSchema> {
        lookup(name)
    }
}

/// An element as the walker sees it: either declared or inferred.
#[derive(Debug, Clone)]
pub struct ElementView {
    /// The concrete JSON property / attribute name.
    pub name: String,
    pub card: Cardinality,
    pub kind: ElementKind,
    pub type_name: Option<&'static str>,
}

/// Infers an element descriptor from a JSON value's shape.
///
/// Objects carrying a `reference` string read as references; objects with
/// `system` and `code` strings read as codings; everything else falls back
/// to plain composites and primitives.
pub fn infer_element(name: &str, value: &Value) -> ElementView {
    if name == "contained" {
        return ElementView {
            name: name.to_string(),
            card: Cardinality::Many,
            kind: ElementKind::Contained,
            type_name: None,
        };
    }
    let (card, sample) = match value {
        Value::Array(items) => (Cardinality::Many, items.first()),
        other => (Cardinality::One, Some(other)),
    };
    let (kind, type_name) = match sample {
        Some(Value::Object(object)) => {
            if object.get("reference").is_some_and(Value::is_string) {
                (ElementKind::Reference, Some("Reference"))
            } else if object.get("code").is_some_and(Value::is_string)
                && object.get("system").is_some_and(Value::is_string)
            {
                (ElementKind::Coding, Some("Coding"))
            } else {
                (ElementKind::Composite, None)
            }
        }
        _ => (ElementKind::Primitive, None),
    };
    ElementView {
        name: name.to_string(),
        card,
        kind,
        type_name,
    }
}

impl ElementDef {
    /// The concrete view of a non-choice element.
    pub fn view(&self) -> ElementView {
        ElementView {
            name: self.name.to_string(),
            card: self.card,
            kind: self.kind,
            type_name: self.type_name,
        }
    }

    /// The concrete view of one choice candidate.
    pub fn choice_view(&self, choice: &Choice) -> ElementView {
        ElementView {
            name: format!("{}{}", self.name, choice.suffix),
            card: self.card,
            kind: choice.kind,
            type_name: choice.type_name,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn declared_schemas_resolve() {
        let registry = SchemaRegistry::new();
        assert!(registry.type_schema("Patient").is_some());
        assert!(registry.type_schema("Observation").is_some());
        assert!(registry.type_schema("Coding").is_some());
        assert!(registry.type_schema("CarePlan").is_none());
    }

    #[test]
    fn coding_schema_carries_its_system_context() {
        let coding = SchemaRegistry::new().type_schema("Coding").unwrap();
        assert_eq!(coding.system_key, Some("system"));
        let code = coding.elements.iter().find(|e| e.name == "code").unwrap();
        assert_eq!(code.kind, ElementKind::Code);
    }

    #[test]
    fn observation_value_is_a_choice() {
        let observation = SchemaRegistry::new().type_schema("Observation").unwrap();
        let value = observation
            .elements
            .iter()
            .find(|e| e.name == "value")
            .unwrap();
        assert!(value.is_choice());
        let quantity = value
            .choices
            .iter()
            .find(|c| c.suffix == "Quantity")
            .unwrap();
        assert_eq!(value.choice_view(quantity).name, "valueQuantity");
        assert_eq!(value.choice_view(quantity).kind, ElementKind::Composite);
    }

    #[test]
    fn inference_classifies_shapes() {
        let reference = infer_element("author", &json!({"reference": "Patient/0"}));
        assert_eq!(reference.kind, ElementKind::Reference);

        let coding = infer_element(
            "priority",
            &json!({"system": "http://acme.org", "code": "high"}),
        );
        assert_eq!(coding.kind, ElementKind::Coding);

        let many = infer_element("alias", &json!(["a", "b"]));
        assert_eq!(many.card, Cardinality::Many);
        assert_eq!(many.kind, ElementKind::Primitive);

        let composite = infer_element("shape", &json!({"width": 2}));
        assert_eq!(composite.kind, ElementKind::Composite);
        assert_eq!(composite.card, Cardinality::One);

        let contained = infer_element("contained", &json!([]));
        assert_eq!(contained.kind, ElementKind::Contained);
    }
}
