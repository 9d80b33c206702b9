use crate::limits::*;
use crate::model::*;

use super::EngineError;

pub(crate) fn validate_appointment(appt: &Appointment) -> Result<(), EngineError> {
    if appt.id.is_empty() {
        return Err(EngineError::LimitExceeded("empty appointment id"));
    }
    if appt.id.len() > MAX_ID_LEN {
        return Err(EngineError::LimitExceeded("appointment id too long"));
    }
    if appt.resource.len() > MAX_NAME_LEN {
        return Err(EngineError::LimitExceeded("therapist name too long"));
    }
    let reason_len = appt.reason.as_ref().map_or(0, String::len);
    if appt.customer.len() > MAX_TEXT_LEN
        || appt.service.len() > MAX_TEXT_LEN
        || reason_len > MAX_TEXT_LEN
    {
        return Err(EngineError::LimitExceeded("text field too long"));
    }
    for t in [appt.start, appt.end] {
        if !(MIN_VALID_TIMESTAMP_MS..MAX_VALID_TIMESTAMP_MS).contains(&t) {
            return Err(EngineError::LimitExceeded("timestamp out of range"));
        }
    }
    // Degenerate intervals pass; the layout handles them.
    if appt.end - appt.start > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("appointment too long"));
    }
    Ok(())
}
