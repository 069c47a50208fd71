mod fanout;
mod link_routing;
mod message_routing;
mod sim_time;
mod topology_network;
