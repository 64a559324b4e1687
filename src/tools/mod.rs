mod access;
mod add_entity;
mod classify_pending;
mod forget;
mod maintain;
mod status;
