mod master;
mod message;
