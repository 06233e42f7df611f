//! Tool definitions exposed to the LLM (§4.8, healthcare tool catalog).
//!
//! Schemas mirror the intake/scheduling/prescription/escalation surface a
//! healthcare voice agent needs; `handoff` lets the model signal it is done
//! and control should return to the orchestrator.

use va_domain::tool::ToolDefinition;

pub fn build_tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "authenticate_user".into(),
            description: "Authenticate a caller by verifying first name, last name, and phone number.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "first_name": { "type": "string", "description": "Caller's first name." },
                    "last_name": { "type": "string", "description": "Caller's last name." },
                    "phone_number": { "type": "string", "description": "Caller's phone number, digits only." }
                },
                "required": ["first_name", "last_name", "phone_number"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "schedule_appointment".into(),
            description: "Schedule or modify a healthcare appointment based on patient preferences and availability.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "patient_name": { "type": "string", "description": "Full name of the patient." },
                    "dob": { "type": "string", "description": "Date of birth (YYYY-MM-DD)." },
                    "appointment_type": { "type": "string", "description": "Type of appointment (consultation, follow-up, etc.)." },
                    "preferred_date": { "type": "string", "description": "Preferred appointment date (YYYY-MM-DD)." },
                    "preferred_time": { "type": "string", "description": "Preferred appointment time (e.g. '10:00 AM')." }
                },
                "required": ["patient_name", "dob", "appointment_type"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "refill_prescription".into(),
            description: "Refill an existing prescription for a patient's medication.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "patient_name": { "type": "string", "description": "Full name of the patient." },
                    "medication_name": { "type": "string", "description": "Name of the medication to refill." },
                    "pharmacy": { "type": "string", "description": "Preferred pharmacy name or location (optional)." }
                },
                "required": ["patient_name", "medication_name"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "medication_info".into(),
            description: "Retrieve basic usage, warnings, and side-effect information about a medication.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "medication_name": { "type": "string", "description": "Medication name to look up." }
                },
                "required": ["medication_name"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "prior_auth_evaluation".into(),
            description: "Analyze a prior-authorization request against patient, physician, clinical, and policy information.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "patient_info": { "type": "object", "description": "Patient demographics and identifiers." },
                    "physician_info": { "type": "object", "description": "Physician specialty and contact details." },
                    "clinical_info": { "type": "object", "description": "Clinical diagnosis, lab results, prior treatments." },
                    "treatment_plan": { "type": "object", "description": "Requested treatment or medication plan." },
                    "policy_text": { "type": "string", "description": "Insurance or payer policy text to evaluate against." }
                },
                "required": ["patient_info", "physician_info", "clinical_info", "treatment_plan", "policy_text"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "emergency_escalate".into(),
            description: "Immediately escalate an urgent healthcare concern to a human agent.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "reason": { "type": "string", "description": "Reason for the escalation (e.g. chest pain, severe symptoms)." }
                },
                "required": ["reason"],
                "additionalProperties": false
            }),
        },
        ToolDefinition {
            name: "handoff".into(),
            description: "Signal that the agent has completed its task and control should return to the orchestrator.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": false
            }),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_tool_name_is_unique() {
        let defs = build_tool_definitions();
        let mut names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), defs.len());
    }

    #[test]
    fn handoff_has_no_required_arguments() {
        let defs = build_tool_definitions();
        let handoff = defs.iter().find(|d| d.name == "handoff").unwrap();
        assert_eq!(handoff.parameters["required"].as_array().unwrap().len(), 0);
    }
}
