//! Tool handler logic, grounded on the reference agent's `functions.py`
//! (authenticate_user / schedule_appointment / refill_prescription /
//! lookup_medication_info / evaluate_prior_authorization /
//! escalate_emergency) with mock lookups replaced by `Directory`.

use serde_json::Value;

use crate::directory::Directory;

fn arg_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(|v| v.as_str())
}

pub fn authenticate_user(dir: &Directory, args: &Value) -> String {
    let first_name = arg_str(args, "first_name").unwrap_or("").trim().to_string();
    let last_name = arg_str(args, "last_name").unwrap_or("").trim().to_string();
    let phone_number = arg_str(args, "phone_number").unwrap_or("").trim().to_string();

    if first_name.is_empty() || last_name.is_empty() || phone_number.is_empty() {
        return "Authentication failed: missing information.".into();
    }

    match dir.find_user(&first_name, &last_name, &phone_number) {
        Some(user) => format!("Authentication successful for {} {}.", user.first_name, user.last_name),
        None => "Authentication failed: user not found.".into(),
    }
}

pub fn schedule_appointment(dir: &Directory, args: &Value) -> String {
    let patient_name = arg_str(args, "patient_name").unwrap_or("");
    let dob = arg_str(args, "dob").unwrap_or("");
    let appointment_type = arg_str(args, "appointment_type").unwrap_or("");
    let preferred_date = arg_str(args, "preferred_date").unwrap_or("next available date");
    let preferred_time = arg_str(args, "preferred_time").unwrap_or("next available time");

    match dir.patients.get(patient_name) {
        Some(record) if record.dob == dob => format!(
            "Appointment for {patient_name} ({appointment_type}) scheduled on {preferred_date} at {preferred_time}."
        ),
        _ => format!(
            "Unable to find patient {patient_name} with the provided date of birth. Please verify your information."
        ),
    }
}

pub fn refill_prescription(dir: &Directory, args: &Value) -> String {
    let patient_name = arg_str(args, "patient_name").unwrap_or("");
    let medication_name = arg_str(args, "medication_name").unwrap_or("");
    let requested_pharmacy = arg_str(args, "pharmacy");

    let Some(prescriptions) = dir.prescriptions.get(patient_name) else {
        return format!(
            "No prescription record found for {medication_name} under {patient_name}. Please verify the medication name."
        );
    };
    let Some(existing) = prescriptions.get(medication_name) else {
        return format!(
            "No prescription record found for {medication_name} under {patient_name}. Please verify the medication name."
        );
    };

    let pharmacy = requested_pharmacy.unwrap_or(&existing.pharmacy);
    format!("Prescription refill for {medication_name} submitted to {pharmacy} for {patient_name}.")
}

pub fn medication_info(dir: &Directory, args: &Value) -> String {
    let medication_name = arg_str(args, "medication_name").unwrap_or("");
    match dir.medications_info.get(medication_name) {
        Some(info) => format!("{medication_name}: {info}"),
        None => format!("Medication {medication_name} not found in our system."),
    }
}

pub fn prior_auth_evaluation(args: &Value) -> String {
    let patient_name = args
        .get("patient_info")
        .and_then(|p| p.get("patient_name"))
        .and_then(|v| v.as_str())
        .unwrap_or("Unknown Patient");
    let requested_medication = args
        .get("treatment_plan")
        .and_then(|t| t.get("requested_medication"))
        .and_then(|v| v.as_str())
        .unwrap_or("unknown medication");

    if patient_name == "Unknown Patient" || requested_medication == "unknown medication" {
        return "Missing critical information for prior authorization evaluation.".into();
    }

    format!(
        "Prior authorization for {requested_medication} for {patient_name} has been reviewed. Further clinical validation may be required."
    )
}

pub fn emergency_escalate(args: &Value) -> String {
    let reason = arg_str(args, "reason").unwrap_or("unspecified reason");
    format!("Emergency escalation triggered: {reason}. A human healthcare agent is now being connected.")
}

pub fn handoff() -> String {
    "Handing off to the next agent.".into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authenticate_user_matches_known_record() {
        let dir = Directory::default();
        let args = serde_json::json!({"first_name": "jane", "last_name": "DOE", "phone_number": "5551234567"});
        assert!(authenticate_user(&dir, &args).starts_with("Authentication successful"));
    }

    #[test]
    fn authenticate_user_rejects_unknown_record() {
        let dir = Directory::default();
        let args = serde_json::json!({"first_name": "No", "last_name": "One", "phone_number": "0000000000"});
        assert!(authenticate_user(&dir, &args).starts_with("Authentication failed"));
    }

    #[test]
    fn schedule_appointment_rejects_dob_mismatch() {
        let dir = Directory::default();
        let args = serde_json::json!({
            "patient_name": "Jane Doe", "dob": "2000-01-01", "appointment_type": "follow-up"
        });
        assert!(schedule_appointment(&dir, &args).starts_with("Unable to find patient"));
    }

    #[test]
    fn refill_prescription_honors_requested_pharmacy_override() {
        let dir = Directory::default();
        let args = serde_json::json!({
            "patient_name": "Jane Doe", "medication_name": "Lisinopril", "pharmacy": "Riverside Pharmacy"
        });
        assert!(refill_prescription(&dir, &args).contains("Riverside Pharmacy"));
    }

    #[test]
    fn prior_auth_evaluation_flags_missing_fields() {
        let args = serde_json::json!({"patient_info": {}, "treatment_plan": {}});
        assert!(prior_auth_evaluation(&args).starts_with("Missing critical information"));
    }
}
