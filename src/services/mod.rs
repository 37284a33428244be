pub(crate) mod mail_service;
pub(crate) mod reset_service;
