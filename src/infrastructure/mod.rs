pub mod my_cnf;
pub mod mysql_session;
