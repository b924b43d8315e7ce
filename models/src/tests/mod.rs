mod port_record;
mod session;
mod token;
