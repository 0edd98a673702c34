pub mod graph;
pub mod ldap;
