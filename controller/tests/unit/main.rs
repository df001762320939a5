mod fakes;
mod test_orchestrator;
mod test_scanner;
mod test_server;
mod test_stations;
