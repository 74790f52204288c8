use crate::models::Appointment;

/// Single-event iCalendar document for an appointment. Times are UTC.
pub fn generate_ics(appointment: &Appointment, business_name: &str, service_names: &[String]) -> String {
    let dtstart = appointment.start_at.format("%Y%m%dT%H%M%SZ").to_string();
    let dtend = appointment.end_at.format("%Y%m%dT%H%M%SZ").to_string();
    let dtstamp = appointment.created_at.format("%Y%m%dT%H%M%SZ").to_string();
    let uid = format!("{}@salonbook", appointment.id);

    let summary = format!("Appointment at {}", escape_text(business_name));
    let description = if service_names.is_empty() {
        "No services listed".to_string()
    } else {
        service_names
            .iter()
            .map(|name| escape_text(name))
            .collect::<Vec<_>>()
            .join("\\, ")
    };
    let status = if appointment.status.is_occupying() {
        "CONFIRMED"
    } else {
        "CANCELLED"
    };

    format!(
        "BEGIN:VCALENDAR\r\n\
         VERSION:2.0\r\n\
         PRODID:-//Salonbook//Appointments//EN\r\n\
         BEGIN:VEVENT\r\n\
         UID:{uid}\r\n\
         DTSTAMP:{dtstamp}\r\n\
         DTSTART:{dtstart}\r\n\
         DTEND:{dtend}\r\n\
         SUMMARY:{summary}\r\n\
         DESCRIPTION:{description}\r\n\
         STATUS:{status}\r\n\
         END:VEVENT\r\n\
         END:VCALENDAR\r\n"
    )
}

/// TEXT value escaping from RFC 5545 section 3.3.11.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push_str("\\\\"),
            ';' => out.push_str("\\;"),
            ',' => out.push_str("\\,"),
            '\r' => {
                if chars.peek() != Some(&'\n') {
                    out.push_str("\\n");
                }
            }
            '\n' => out.push_str("\\n"),
            c if c.is_control() => {}
            c => out.push(c),
        }
    }
    out
}
