mod broker;
mod helpers;
mod service;
mod worker;
