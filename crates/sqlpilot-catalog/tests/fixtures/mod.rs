//! Shared fixtures for catalog integration tests
//!
//! A small clinic schema that exercises synonyms, business context and
//! relationships the way a real schema description would.

#![allow(dead_code)]

use serde_json::{json, Value};
use sqlpilot_catalog::Row;
use sqlpilot_core::SchemaModel;

pub const CLINIC_SCHEMA: &str = r#"{
    "dialect": "sqlite",
    "tables": [
        {
            "name": "cita",
            "description": "Citas medicas agendadas por los pacientes",
            "business_context": "Cada visita a la clinica genera una cita",
            "synonyms": ["turno", "consulta"],
            "columns": [
                {"name": "id_cita", "type": "INTEGER", "pk": true, "identity": true},
                {"name": "fecha_cita", "type": "DATETIME", "nullable": false},
                {"name": "estado", "type": "TEXT", "description": "programada, confirmada o cancelada"},
                {"name": "id_paciente", "type": "INTEGER", "references": "paciente.id_paciente"}
            ]
        },
        {
            "name": "paciente",
            "description": "Personas atendidas en la clinica",
            "synonyms": ["cliente", "usuario"],
            "columns": [
                {"name": "id_paciente", "type": "INTEGER", "pk": true},
                {"name": "nombre", "type": "TEXT"},
                {"name": "fecha_registro", "type": "DATE"}
            ]
        },
        {
            "name": "pago",
            "description": "Pagos recibidos por servicios",
            "related_concepts": ["factura", "cobro"],
            "columns": [
                {"name": "id_pago", "type": "INTEGER", "pk": true},
                {"name": "id_cita", "type": "INTEGER", "references": "cita.id_cita"},
                {"name": "monto", "type": "REAL"}
            ]
        }
    ]
}"#;

pub fn clinic_schema() -> SchemaModel {
    SchemaModel::from_json_str(CLINIC_SCHEMA).expect("fixture schema is valid")
}

/// Build a row from a JSON object literal
pub fn row(value: Value) -> Row {
    value.as_object().cloned().unwrap_or_default()
}

pub fn count_row(total: i64) -> Row {
    row(json!({ "COUNT(*)": total }))
}
