pub(crate) mod auth_dtos;
