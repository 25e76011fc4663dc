//! Notification payloads for agents and sellers.

use crate::models::{Contact, EmailMessage, NotificationRequest, PushMessage, TourStop};

fn request_for(contact: &Contact, title: &str, body: String) -> NotificationRequest {
    NotificationRequest {
        user_id: contact.id.clone(),
        push: Some(PushMessage {
            title: title.to_string(),
            body: body.clone(),
        }),
        sms: contact.phone.as_ref().map(|_| body.clone()),
        email: contact.email.as_ref().map(|_| EmailMessage {
            subject: title.to_string(),
            body: format!("Hi {},\n\n{}", contact.name, body),
        }),
    }
}

fn showing_party(sender: Option<&Contact>) -> String {
    match sender {
        Some(agent) => format!("{} and their client", agent.name),
        None => "A touring agent and their client".to_string(),
    }
}

pub fn next_up_for_agent(
    stop: &TourStop,
    agent: &Contact,
    sender: Option<&Contact>,
) -> NotificationRequest {
    let body = format!(
        "{} are heading to {} next.",
        showing_party(sender),
        stop.address
    );
    request_for(agent, "Showing up next", body)
}

pub fn next_up_for_seller(
    stop: &TourStop,
    seller: &Contact,
    sender: Option<&Contact>,
) -> NotificationRequest {
    let body = format!(
        "{} are on the way to {}. Please make sure the home is ready.",
        showing_party(sender),
        stop.address
    );
    request_for(seller, "Your showing is up next", body)
}

pub fn departure_for_seller(
    stop: &TourStop,
    seller: &Contact,
    sender: Option<&Contact>,
) -> NotificationRequest {
    let body = format!(
        "{} have left {}. You are welcome to return home.",
        showing_party(sender),
        stop.address
    );
    request_for(seller, "Showing finished", body)
}
