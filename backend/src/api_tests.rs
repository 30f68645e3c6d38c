use crate::api::{AppointmentId, ClientId, InvoiceId};

#[test]
fn test_client_id_new() {
    let id = ClientId::new(42);
    assert_eq!(id.value(), 42);
}

#[test]
fn test_id_equality_and_ordering() {
    let a = AppointmentId::new(1);
    let b = AppointmentId::new(2);
    assert_ne!(a, b);
    assert!(a < b);
    assert_eq!(a, AppointmentId::from(1));
}

#[test]
fn test_id_display() {
    assert_eq!(InvoiceId::new(7).to_string(), "7");
}

#[test]
fn test_id_into_i64() {
    let raw: i64 = ClientId::new(999).into();
    assert_eq!(raw, 999);
}

#[test]
fn test_id_serializes_as_bare_number() {
    let json = serde_json::to_string(&ClientId::new(5)).unwrap();
    assert_eq!(json, "5");
    let back: ClientId = serde_json::from_str("5").unwrap();
    assert_eq!(back, ClientId::new(5));
}
