mod checksum;
mod ip_layer;
mod support;
mod tcp_conn;
