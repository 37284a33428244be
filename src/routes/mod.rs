pub(crate) mod auth;
pub(crate) mod password_reset_routes;
pub(crate) mod projects;
pub(crate) mod appointments;
pub(crate) mod messages;
pub(crate) mod dashboard;
