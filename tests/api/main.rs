mod contact;
mod cors;
mod health_check;
