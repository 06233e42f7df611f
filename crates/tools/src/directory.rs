//! In-memory mock directories backing the tool handlers.
//!
//! A real deployment would back these with a patient-records system; this
//! gateway only needs somewhere to look up the handful of fixtures the
//! healthcare demo agent exercises.

use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct PatientRecord {
    pub dob: String,
}

#[derive(Debug, Clone)]
pub struct PrescriptionRecord {
    pub pharmacy: String,
}

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub first_name: String,
    pub last_name: String,
    pub phone_number: String,
}

#[derive(Debug, Clone)]
pub struct Directory {
    pub users: Vec<UserRecord>,
    pub patients: HashMap<String, PatientRecord>,
    pub prescriptions: HashMap<String, HashMap<String, PrescriptionRecord>>,
    pub medications_info: HashMap<String, String>,
}

impl Default for Directory {
    fn default() -> Self {
        let mut patients = HashMap::new();
        patients.insert("Jane Doe".into(), PatientRecord { dob: "1985-04-12".into() });
        patients.insert("John Smith".into(), PatientRecord { dob: "1970-09-30".into() });

        let mut jane_rx = HashMap::new();
        jane_rx.insert("Lisinopril".into(), PrescriptionRecord { pharmacy: "Main Street Pharmacy".into() });
        let mut prescriptions = HashMap::new();
        prescriptions.insert("Jane Doe".into(), jane_rx);

        let mut medications_info = HashMap::new();
        medications_info.insert(
            "Lisinopril".into(),
            "Used to treat high blood pressure. Common side effects include dizziness and dry cough.".into(),
        );
        medications_info.insert(
            "Metformin".into(),
            "Used to control blood sugar in type 2 diabetes. May cause nausea or stomach upset.".into(),
        );

        Self {
            users: vec![UserRecord {
                first_name: "Jane".into(),
                last_name: "Doe".into(),
                phone_number: "5551234567".into(),
            }],
            patients,
            prescriptions,
            medications_info,
        }
    }
}

impl Directory {
    pub fn find_user(&self, first_name: &str, last_name: &str, phone_number: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| {
            u.first_name.eq_ignore_ascii_case(first_name)
                && u.last_name.eq_ignore_ascii_case(last_name)
                && u.phone_number == phone_number
        })
    }
}
