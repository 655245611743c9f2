@@ 1 DELETE 1
=== END FILE ===