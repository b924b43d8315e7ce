mod worker_process;
