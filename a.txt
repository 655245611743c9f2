@@ 2 INSERT
new
=== END FILE ===